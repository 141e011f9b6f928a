//! Scheduler — runs an indexer once at start-up, then on a fixed period.
//!
//! Runs of one instance never overlap: the loop awaits each run before
//! waiting for the next tick, and ticks missed while a run was in flight are
//! dropped rather than queued. Shutdown is only observed between runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::IndexerError;
use crate::indexer::{IndexerInstance, Pipeline, RunOutcome};

/// Something the scheduler can run repeatedly.
#[async_trait]
pub trait Runnable: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn run_once(&self) -> Result<RunOutcome, IndexerError>;
}

#[async_trait]
impl<P: Pipeline> Runnable for IndexerInstance<P> {
    fn name(&self) -> &str {
        IndexerInstance::name(self)
    }

    async fn run_once(&self) -> Result<RunOutcome, IndexerError> {
        self.run().await
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Spawn the polling loop for `task`. The first run starts immediately.
    /// The loop exits once `shutdown` turns `true` or its sender is dropped.
    pub fn spawn(
        task: Arc<dyn Runnable>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let name = task.name().to_string();
            info!(indexer = %name, period_ms = period.as_millis() as u64, "scheduler started");

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }

                match task.run_once().await {
                    Ok(RunOutcome::Skipped) => {
                        debug!(indexer = %name, "previous run still in flight, tick dropped");
                    }
                    Ok(RunOutcome::Completed { windows, accepted, cursor }) => {
                        debug!(indexer = %name, windows, accepted, cursor, "tick complete");
                    }
                    Err(e) => {
                        error!(indexer = %name, error = %e, "run failed, retrying next tick");
                    }
                }
            }
            info!(indexer = %name, "scheduler stopped");
        })
    }
}
