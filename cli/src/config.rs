//! Service configuration, read from the environment at start-up.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fundindex_core::error::IndexerError;
use fundindex_core::indexer::IndexerSettings;
use fundindex_evm::IndexerBuilder;

use crate::logging::LogConfig;

/// Where checkpoints are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateBackend {
    /// One shared JSON document, partitioned by indexer name.
    #[default]
    JsonFile,
    /// SQLite database (requires the `sqlite` feature).
    Sqlite,
}

impl FromStr for StateBackend {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "json_file" | "file" => Ok(Self::JsonFile),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(IndexerError::Config(format!(
                "STATE_BACKEND must be json or sqlite, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub provider_url: String,
    pub platform_address: String,
    pub start_block: Option<u64>,
    pub lookback_blocks: u64,
    pub poll_interval_secs: u64,
    pub chunk_size: u64,
    pub address_batch_size: usize,
    pub batch_delay_ms: u64,
    pub window_delay_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub request_timeout_secs: u64,
    pub state_file: PathBuf,
    pub state_backend: StateBackend,
    pub http_addr: SocketAddr,
    pub log: LogConfig,
}

fn default_lookback() -> u64 {
    5_000
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_chunk_size() -> u64 {
    10
}
fn default_address_batch_size() -> usize {
    20
}
fn default_batch_delay_ms() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    700
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_state_file() -> PathBuf {
    PathBuf::from("./indexer-state.json")
}
fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, IndexerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider_url = get("PROVIDER_URL")
            .ok_or_else(|| IndexerError::Config("PROVIDER_URL is required".into()))?;
        let platform_address = get("PLATFORM_ADDRESS")
            .ok_or_else(|| IndexerError::Config("PLATFORM_ADDRESS is required".into()))?;
        if !is_address(&platform_address) {
            return Err(IndexerError::Config(format!(
                "PLATFORM_ADDRESS is not a 20-byte hex address: {platform_address}"
            )));
        }

        let config = Self {
            provider_url,
            platform_address: platform_address.to_ascii_lowercase(),
            start_block: get("START_BLOCK").map(|v| parse("START_BLOCK", &v)).transpose()?,
            lookback_blocks: parse_or(&get, "LOOKBACK_BLOCKS", default_lookback())?,
            poll_interval_secs: parse_or(&get, "POLL_INTERVAL_SECS", default_poll_interval_secs())?,
            chunk_size: parse_or(&get, "CHUNK_SIZE", default_chunk_size())?,
            address_batch_size: parse_or(&get, "ADDRESS_BATCH_SIZE", default_address_batch_size())?,
            batch_delay_ms: parse_or(&get, "BATCH_DELAY_MS", default_batch_delay_ms())?,
            window_delay_ms: parse_or(&get, "WINDOW_DELAY_MS", 0)?,
            max_retries: parse_or(&get, "MAX_RETRIES", default_max_retries())?,
            backoff_base_ms: parse_or(&get, "BACKOFF_BASE_MS", default_backoff_base_ms())?,
            request_timeout_secs: parse_or(
                &get,
                "REQUEST_TIMEOUT_SECS",
                default_request_timeout_secs(),
            )?,
            state_file: get("STATE_FILE").map(PathBuf::from).unwrap_or_else(default_state_file),
            state_backend: parse_or(&get, "STATE_BACKEND", StateBackend::JsonFile)?,
            http_addr: parse_or(&get, "HTTP_ADDR", default_http_addr())?,
            log: LogConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
                json: parse_or(&get, "LOG_JSON", false)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), IndexerError> {
        let positive = [
            ("CHUNK_SIZE", self.chunk_size),
            ("ADDRESS_BATCH_SIZE", self.address_batch_size as u64),
            ("MAX_RETRIES", u64::from(self.max_retries)),
            ("POLL_INTERVAL_SECS", self.poll_interval_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(IndexerError::Config(format!("{key} must be at least 1")));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Engine settings shared by the three indexers.
    pub fn indexer_settings(&self) -> IndexerSettings {
        IndexerBuilder::new()
            .window_size(self.chunk_size)
            .window_delay(Duration::from_millis(self.window_delay_ms))
            .lookback(self.lookback_blocks)
            .start_block(self.start_block)
            .max_attempts(self.max_retries)
            .base_backoff(Duration::from_millis(self.backoff_base_ms))
            .build_settings()
    }
}

fn is_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .is_some_and(|body| body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()))
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, IndexerError> {
    value
        .trim()
        .parse()
        .map_err(|_| IndexerError::Config(format!("{key} has an invalid value: {value:?}")))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, IndexerError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}
