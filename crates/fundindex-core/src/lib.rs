//! fundindex-core — the chunked, checkpointed log-indexing engine.
//!
//! # Architecture
//!
//! ```text
//! Scheduler → IndexerInstance::run()
//!                 ├── RangeScanner      (bounded block windows, cursor commits)
//!                 ├── RetryableFetcher  (throttling backoff around LogSource)
//!                 ├── Pipeline          (decode + dedup + append, per event family)
//!                 └── CheckpointManager (cursor + result set, best-effort persist)
//! ```

pub mod checkpoint;
pub mod cursor;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod indexer;
pub mod scanner;
pub mod scheduler;
pub mod source;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use checkpoint::{CheckpointManager, CheckpointStore, MemoryCheckpointStore, StoredCheckpoint};
pub use cursor::Cursor;
pub use dedup::{DedupLog, DedupSet};
pub use error::IndexerError;
pub use fetcher::{RetryConfig, RetryPolicy, RetryableFetcher};
pub use indexer::{IndexerInstance, IndexerPhase, IndexerSettings, IndexerStatus, Pipeline, RunOutcome};
pub use scanner::{BlockWindow, RangeScanner, ScanOutcome, WindowHandler};
pub use scheduler::{Runnable, Scheduler};
pub use source::{LogSource, SourceError};
pub use types::{LogQuery, RawLog};
