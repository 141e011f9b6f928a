//! Indexer instances — one named, checkpointed pipeline each.
//!
//! An [`IndexerInstance`] owns its cursor, its result collection and dedup
//! set (the pipeline `State`), its checkpoint partition and its re-entrancy
//! latch. Nothing is shared between instances except what a pipeline is
//! handed explicitly at construction.
//!
//! ```text
//! UNINITIALIZED ──first run()──▶ BACKFILLING ──caught up──▶ POLLING
//!                                     ▲                        │
//!                                     └──fell behind (slow run)┘
//! ```
//!
//! Backfilling and polling share one code path; the phase only reflects how
//! far behind the head the cursor was when the run started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::cursor::Cursor;
use crate::error::IndexerError;
use crate::fetcher::{RetryConfig, RetryableFetcher};
use crate::scanner::{BlockWindow, RangeScanner, WindowHandler};
use crate::source::LogSource;

/// Engine settings for one indexer instance.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    /// Blocks per query; the provider's hard range limit.
    pub window_size: u64,
    /// Pause between windows.
    pub window_delay: Duration,
    /// Cold-start distance behind the head when no start block is given.
    pub lookback: u64,
    /// Explicit first block for a cold start (inclusive).
    pub start_block: Option<u64>,
    /// Throttling retry policy.
    pub retry: RetryConfig,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            window_size: 10,
            window_delay: Duration::ZERO,
            lookback: 5_000,
            start_block: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Lifecycle phase of an indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerPhase {
    /// No run has loaded a checkpoint yet.
    Uninitialized,
    /// Catching up from a cold-start or stale cursor.
    Backfilling,
    /// Within one window of the head.
    Polling,
}

impl std::fmt::Display for IndexerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Backfilling => write!(f, "backfilling"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

/// Point-in-time status of an indexer, for the read surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStatus {
    pub name: String,
    pub phase: IndexerPhase,
    #[serde(with = "crate::types::u64_string")]
    pub last_processed_block: u64,
    pub head_block: Option<u64>,
    pub records: usize,
    pub running: bool,
    pub last_run_at: Option<i64>,
    pub last_error: Option<String>,
}

/// Result of one `run()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run was already in flight; nothing was done.
    Skipped,
    Completed {
        windows: usize,
        accepted: usize,
        cursor: u64,
    },
}

/// One event family: how to fetch and decode it, and how it folds into the
/// indexer's state.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Result collection plus dedup set; persisted with the checkpoint.
    type State: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static;
    /// A decoded domain event.
    type Event: Send + 'static;

    /// Checkpoint partition key and log label.
    fn name(&self) -> &str;

    /// Hook run at the start of every `run()`, before the head is read.
    async fn refresh(&self) {}

    /// Hook run once per `run()` after the checkpoint is loaded and before
    /// any window is scanned. Returned events are applied and checkpointed
    /// under the current cursor, so a pipeline can re-fetch work it recorded
    /// as incomplete in its state.
    async fn recover(&self, _fetcher: &RetryableFetcher, _state: &Self::State) -> Vec<Self::Event> {
        Vec::new()
    }

    /// Fetch and decode every event in `window`. `state` is the state as of
    /// the last committed window. An error aborts the window.
    async fn collect(
        &self,
        fetcher: &RetryableFetcher,
        window: BlockWindow,
        state: &Self::State,
    ) -> Result<Vec<Self::Event>, IndexerError>;

    /// Fold one event into the state. Returns `true` if the state changed;
    /// duplicates return `false` and leave the state untouched.
    fn apply(&self, state: &mut Self::State, event: Self::Event) -> bool;

    /// Number of records in the result collection.
    fn record_count(&self, state: &Self::State) -> usize;
}

struct Working<S> {
    cursor: Cursor,
    state: S,
}

#[derive(Debug, Clone)]
struct RunMeta {
    phase: IndexerPhase,
    cursor: u64,
    head: Option<u64>,
    last_run_at: Option<i64>,
    last_error: Option<String>,
}

/// Clears the running latch when a run ends, however it ends.
struct RunLatch<'a>(&'a AtomicBool);

impl Drop for RunLatch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A named indexing pipeline with its own cursor, state and checkpoint.
pub struct IndexerInstance<P: Pipeline> {
    pipeline: P,
    settings: IndexerSettings,
    fetcher: RetryableFetcher,
    scanner: RangeScanner,
    checkpoint: CheckpointManager<P::State>,
    running: AtomicBool,
    work: tokio::sync::Mutex<Option<Working<P::State>>>,
    snapshot: RwLock<Arc<P::State>>,
    meta: RwLock<RunMeta>,
}

impl<P: Pipeline> IndexerInstance<P> {
    pub fn new(
        pipeline: P,
        settings: IndexerSettings,
        source: Arc<dyn LogSource>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let checkpoint = CheckpointManager::new(store, pipeline.name());
        let fetcher = RetryableFetcher::new(source, settings.retry.clone());
        let scanner =
            RangeScanner::new(settings.window_size).with_window_delay(settings.window_delay);
        Self {
            pipeline,
            settings,
            fetcher,
            scanner,
            checkpoint,
            running: AtomicBool::new(false),
            work: tokio::sync::Mutex::new(None),
            snapshot: RwLock::new(Arc::new(P::State::default())),
            meta: RwLock::new(RunMeta {
                phase: IndexerPhase::Uninitialized,
                cursor: 0,
                head: None,
                last_run_at: None,
                last_error: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.pipeline.name()
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn settings(&self) -> &IndexerSettings {
        &self.settings
    }

    /// The last published state. Never blocks on a run in progress.
    pub fn snapshot(&self) -> Arc<P::State> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Last processed block (0 before the first run).
    pub fn cursor(&self) -> u64 {
        self.read_meta().cursor
    }

    pub fn phase(&self) -> IndexerPhase {
        self.read_meta().phase
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> IndexerStatus {
        let meta = self.read_meta();
        IndexerStatus {
            name: self.name().to_string(),
            phase: meta.phase,
            last_processed_block: meta.cursor,
            head_block: meta.head,
            records: self.pipeline.record_count(&self.snapshot()),
            running: self.is_running(),
            last_run_at: meta.last_run_at,
            last_error: meta.last_error,
        }
    }

    /// Scan from the cursor up to the current head.
    ///
    /// Returns [`RunOutcome::Skipped`] without doing anything if another
    /// `run()` on this instance is still in flight.
    pub async fn run(&self) -> Result<RunOutcome, IndexerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(indexer = %self.name(), "run already in progress, skipping");
            return Ok(RunOutcome::Skipped);
        }
        let _latch = RunLatch(&self.running);

        let result = self.run_inner().await;

        let mut meta = self.write_meta();
        meta.last_run_at = Some(chrono::Utc::now().timestamp());
        meta.last_error = result.as_ref().err().map(|e| e.to_string());
        result
    }

    async fn run_inner(&self) -> Result<RunOutcome, IndexerError> {
        self.pipeline.refresh().await;
        let head = self.fetcher.head_block_number().await?;
        self.write_meta().head = Some(head);

        let mut work = self.work.lock().await;
        if work.is_none() {
            *work = Some(self.initialize(head).await);
        }
        let working = work
            .as_mut()
            .ok_or_else(|| IndexerError::Other("indexer state missing after load".into()))?;
        let recovered = self.recover(working).await;

        let start = working.cursor.block_number;
        if working.cursor.caught_up(head) {
            self.write_meta().phase = IndexerPhase::Polling;
            debug!(indexer = %self.name(), cursor = start, head, "nothing to scan");
            return Ok(RunOutcome::Completed {
                windows: 0,
                accepted: recovered,
                cursor: start,
            });
        }

        self.write_meta().phase = if head - start > self.scanner.window_size() {
            IndexerPhase::Backfilling
        } else {
            IndexerPhase::Polling
        };

        let mut handler = RunHandler {
            instance: self,
            working,
            accepted: recovered,
        };
        let scanned = self.scanner.scan(start, head, &mut handler).await;
        let accepted = handler.accepted;

        match scanned {
            Ok(outcome) => {
                self.write_meta().phase = IndexerPhase::Polling;
                info!(
                    indexer = %self.name(),
                    from = start + 1,
                    to = outcome.cursor,
                    windows = outcome.windows,
                    accepted,
                    "run complete"
                );
                Ok(RunOutcome::Completed {
                    windows: outcome.windows,
                    accepted,
                    cursor: outcome.cursor,
                })
            }
            Err(e) => {
                warn!(
                    indexer = %self.name(),
                    cursor = self.cursor(),
                    head,
                    accepted,
                    error = %e,
                    "scan aborted, resuming from last committed window next run"
                );
                Err(e)
            }
        }
    }

    async fn initialize(&self, head: u64) -> Working<P::State> {
        let (cursor, state) = match self.checkpoint.load().await {
            Some((cursor, state)) => {
                info!(
                    indexer = %self.name(),
                    block = cursor.block_number,
                    records = self.pipeline.record_count(&state),
                    "resuming from checkpoint"
                );
                (cursor, state)
            }
            None => {
                let cursor =
                    Cursor::cold_start(head, self.settings.lookback, self.settings.start_block);
                info!(
                    indexer = %self.name(),
                    block = cursor.block_number,
                    head,
                    "no checkpoint, cold start"
                );
                (cursor, P::State::default())
            }
        };
        self.publish(&state);
        self.write_meta().cursor = cursor.block_number;
        Working { cursor, state }
    }

    async fn recover(&self, working: &mut Working<P::State>) -> usize {
        let events = self.pipeline.recover(&self.fetcher, &working.state).await;
        let mut changed = 0usize;
        for event in events {
            if self.pipeline.apply(&mut working.state, event) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.publish(&working.state);
            self.checkpoint.save(working.cursor, &working.state).await;
            info!(indexer = %self.name(), changed, "recovered earlier work");
        }
        changed
    }

    fn publish(&self, state: &P::State) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(state.clone());
    }

    fn read_meta(&self) -> RunMeta {
        self.meta.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn write_meta(&self) -> std::sync::RwLockWriteGuard<'_, RunMeta> {
        self.meta.write().unwrap_or_else(|e| e.into_inner())
    }
}

struct RunHandler<'a, P: Pipeline> {
    instance: &'a IndexerInstance<P>,
    working: &'a mut Working<P::State>,
    accepted: usize,
}

#[async_trait]
impl<'a, P: Pipeline> WindowHandler for RunHandler<'a, P> {
    async fn process(&mut self, window: BlockWindow) -> Result<(), IndexerError> {
        let instance = self.instance;
        let events = instance
            .pipeline
            .collect(&instance.fetcher, window, &self.working.state)
            .await?;

        let mut changed = 0usize;
        for event in events {
            if instance.pipeline.apply(&mut self.working.state, event) {
                changed += 1;
            }
        }
        if changed > 0 {
            instance.publish(&self.working.state);
            debug!(indexer = %instance.name(), %window, changed, "window recorded");
        }
        self.accepted += changed;
        Ok(())
    }

    async fn commit(&mut self, window: BlockWindow) {
        let instance = self.instance;
        if self.working.cursor.advance(window.to) {
            instance.write_meta().cursor = window.to;
        }
        instance
            .checkpoint
            .save(self.working.cursor, &self.working.state)
            .await;
    }
}
