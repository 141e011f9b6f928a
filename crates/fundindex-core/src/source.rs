//! The log-source boundary: the remote node (or indexing provider) the
//! engine pulls logs from.
//!
//! Throttling is classified here, once, when the error is constructed.
//! Everything downstream only asks [`SourceError::is_throttling`].

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{LogQuery, RawLog};

/// Message fragments providers use for rate/compute-unit rejections.
const THROTTLE_FRAGMENTS: &[&str] = &[
    "compute units",
    "throughput",
    "rate limit",
    "too many requests",
    "exceeded its capacity",
];

/// JSON-RPC error codes that mean "slow down".
const THROTTLE_RPC_CODES: &[i64] = &[429, -32005];

/// Errors returned by a [`LogSource`].
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The provider rejected the call because of rate or compute limits.
    #[error("throttled by provider: {0}")]
    Throttled(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection refused, timeout, TLS failure, ...
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be parsed.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Returns `true` if the error is a transient provider rejection that
    /// should be retried with backoff.
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    /// Build an error from a JSON-RPC error object, classifying throttling.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if THROTTLE_RPC_CODES.contains(&code) || mentions_throttling(&message) {
            Self::Throttled(format!("RPC {code}: {message}"))
        } else {
            Self::Rpc { code, message }
        }
    }

    /// Build an error from a non-success HTTP status, classifying throttling.
    pub fn from_http(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 429 || mentions_throttling(&body) {
            Self::Throttled(format!("HTTP {status}: {body}"))
        } else {
            Self::Http { status, body }
        }
    }
}

fn mentions_throttling(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    THROTTLE_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// A remote source of EVM-style logs.
///
/// Implementations must be `Send + Sync`; one source is shared by every
/// indexer instance in the process.
#[async_trait]
pub trait LogSource: Send + Sync + 'static {
    /// The most recent block number known to the source.
    async fn head_block_number(&self) -> Result<u64, SourceError>;

    /// All logs in `[query.from_block, query.to_block]` matching the query,
    /// ordered by block then log index.
    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, SourceError>;

    /// Read-only contract call at the latest block. Returns the raw return data.
    async fn call(&self, to: &str, data: &str) -> Result<String, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_is_throttling() {
        assert!(SourceError::from_http(429, "slow down").is_throttling());
        assert!(!SourceError::from_http(500, "boom").is_throttling());
    }

    #[test]
    fn compute_unit_message_is_throttling() {
        let err = SourceError::from_rpc(
            -32000,
            "Your app has exceeded its Compute Units per second capacity",
        );
        assert!(err.is_throttling());
    }

    #[test]
    fn rate_limit_code_is_throttling() {
        assert!(SourceError::from_rpc(-32005, "limit").is_throttling());
        assert!(SourceError::from_rpc(429, "").is_throttling());
    }

    #[test]
    fn other_rpc_errors_are_fatal() {
        let err = SourceError::from_rpc(-32602, "block range too large");
        assert!(!err.is_throttling());
        assert!(matches!(err, SourceError::Rpc { code: -32602, .. }));
    }
}
