//! Fluent builder for indexer settings.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use fundindex_evm::IndexerBuilder;
//!
//! let settings = IndexerBuilder::new()
//!     .window_size(10)
//!     .lookback(5_000)
//!     .max_attempts(5)
//!     .base_backoff(Duration::from_millis(700))
//!     .build_settings();
//! assert_eq!(settings.window_size, 10);
//! ```

use std::time::Duration;

use fundindex_core::indexer::IndexerSettings;

/// Fluent builder for `IndexerSettings`.
#[derive(Default)]
pub struct IndexerBuilder {
    settings: IndexerSettings,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            settings: IndexerSettings::default(),
        }
    }

    /// Set the number of blocks per window.
    pub fn window_size(mut self, blocks: u64) -> Self {
        self.settings.window_size = blocks.max(1);
        self
    }

    /// Set the pause between consecutive windows.
    pub fn window_delay(mut self, delay: Duration) -> Self {
        self.settings.window_delay = delay;
        self
    }

    /// Set how far behind head a cold start begins.
    pub fn lookback(mut self, blocks: u64) -> Self {
        self.settings.lookback = blocks;
        self
    }

    /// Set the first block to index on a cold start (inclusive).
    pub fn start_block(mut self, block: Option<u64>) -> Self {
        self.settings.start_block = block;
        self
    }

    /// Set the total number of attempts for a throttled request.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.settings.retry.max_attempts = attempts.max(1);
        self
    }

    /// Set the backoff before the first retry.
    pub fn base_backoff(mut self, delay: Duration) -> Self {
        self.settings.retry.base_backoff = delay;
        self
    }

    /// Build the `IndexerSettings`.
    pub fn build_settings(self) -> IndexerSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let s = IndexerBuilder::new().build_settings();
        assert_eq!(s.window_size, 10);
        assert_eq!(s.lookback, 5_000);
        assert_eq!(s.start_block, None);
        assert_eq!(s.retry.max_attempts, 5);
        assert_eq!(s.retry.base_backoff, Duration::from_millis(700));
    }

    #[test]
    fn builder_custom() {
        let s = IndexerBuilder::new()
            .window_size(0)
            .lookback(100)
            .start_block(Some(42))
            .max_attempts(3)
            .window_delay(Duration::from_millis(5))
            .build_settings();
        assert_eq!(s.window_size, 1);
        assert_eq!(s.lookback, 100);
        assert_eq!(s.start_block, Some(42));
        assert_eq!(s.retry.max_attempts, 3);
        assert_eq!(s.window_delay, Duration::from_millis(5));
    }
}
