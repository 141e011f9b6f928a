//! Error types for the indexing engine.

use thiserror::Error;

use crate::source::SourceError;

/// Errors that can occur while running an indexer.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// A non-throttling failure from the log source. Fatal for the current window.
    #[error("log source error: {0}")]
    Source(#[from] SourceError),

    /// The source kept throttling past the attempt ceiling.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: SourceError },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the failure is expected to clear up on a later run
    /// (throttling or transport trouble) rather than indicating a bad query.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RetriesExhausted { .. } => true,
            Self::Source(e) => e.is_throttling() || matches!(e, SourceError::Transport(_)),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_retries_are_transient() {
        let err = IndexerError::RetriesExhausted {
            attempts: 5,
            last: SourceError::Throttled("429".into()),
        };
        assert!(err.is_transient());
        assert!(err.to_string().contains("5 attempts"));
    }

    #[test]
    fn rpc_errors_are_not_transient() {
        let err = IndexerError::from(SourceError::Rpc {
            code: -32602,
            message: "invalid params".into(),
        });
        assert!(!err.is_transient());
    }
}
