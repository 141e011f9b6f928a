//! Retrying log fetcher — wraps one bounded-range query with throttling
//! backoff.
//!
//! Throttling is retried after `base * 2^attempt` up to `max_attempts` calls
//! in total. Any other source error is returned on the spot. A call either
//! yields the full log list or an error, never a partial result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::IndexerError;
use crate::source::{LogSource, SourceError};
use crate::types::{LogQuery, RawLog};

/// Configuration for the throttling retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of calls, counting the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(700),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Stateless policy: computes the delay for a given attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay after the `attempt`-th failed call (0-based): `base * 2^attempt`.
    /// Returns `None` once no calls remain.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.config.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .config
            .base_backoff
            .checked_mul(factor)
            .unwrap_or(self.config.max_backoff);
        Some(delay.min(self.config.max_backoff))
    }
}

/// Log fetcher with throttling retry around a shared [`LogSource`].
#[derive(Clone)]
pub struct RetryableFetcher {
    source: Arc<dyn LogSource>,
    policy: RetryPolicy,
}

impl RetryableFetcher {
    pub fn new(source: Arc<dyn LogSource>, config: RetryConfig) -> Self {
        Self {
            source,
            policy: RetryPolicy::new(config),
        }
    }

    pub fn source(&self) -> &Arc<dyn LogSource> {
        &self.source
    }

    /// Fetch all logs matching `query`.
    pub async fn fetch(&self, query: &LogQuery) -> Result<Vec<RawLog>, IndexerError> {
        self.retrying("eth_getLogs", || self.source.get_logs(query)).await
    }

    /// Current chain head.
    pub async fn head_block_number(&self) -> Result<u64, IndexerError> {
        self.retrying("eth_blockNumber", || self.source.head_block_number())
            .await
    }

    /// Read-only contract call.
    pub async fn call(&self, to: &str, data: &str) -> Result<String, IndexerError> {
        self.retrying("eth_call", || self.source.call(to, data)).await
    }

    async fn retrying<T, F, Fut>(&self, method: &str, mut op: F) -> Result<T, IndexerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_throttling() => match self.policy.next_delay(attempt) {
                    Some(delay) => {
                        warn!(
                            method,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "provider throttling, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        error!(method, attempts = attempt + 1, error = %e, "max retries exceeded");
                        return Err(IndexerError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: e,
                        });
                    }
                },
                Err(e) => return Err(IndexerError::Source(e)),
            }
        }
    }
}
