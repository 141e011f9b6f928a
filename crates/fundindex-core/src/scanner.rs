//! Range scanner — walks `[cursor + 1, head]` in consecutive windows no
//! larger than the provider's per-call block limit.
//!
//! After each window is processed the handler commits the cursor to the
//! window's upper bound before the next window starts. A failing window
//! aborts the scan and nothing past the last committed window is recorded,
//! so the next scan resumes exactly there.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::IndexerError;

/// An inclusive block range submitted as one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from: u64,
    pub to: u64,
}

impl BlockWindow {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks in the window.
    pub fn span(&self) -> u64 {
        self.to - self.from + 1
    }
}

impl std::fmt::Display for BlockWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Receives windows from [`RangeScanner::scan`].
#[async_trait]
pub trait WindowHandler: Send {
    /// Fetch, decode and record everything in `window`.
    async fn process(&mut self, window: BlockWindow) -> Result<(), IndexerError>;

    /// Advance and persist the cursor to `window.to`. Called only after
    /// `process` succeeded for the same window.
    async fn commit(&mut self, window: BlockWindow);
}

/// Summary of a completed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Windows processed and committed.
    pub windows: usize,
    /// Cursor after the scan (upper bound of the last committed window).
    pub cursor: u64,
}

/// Splits block ranges into bounded windows and drives a [`WindowHandler`].
#[derive(Debug, Clone)]
pub struct RangeScanner {
    window_size: u64,
    window_delay: Duration,
}

impl RangeScanner {
    /// `window_size` is the provider's hard block limit per query (minimum 1).
    pub fn new(window_size: u64) -> Self {
        Self {
            window_size: window_size.max(1),
            window_delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive windows (client-side rate limiting).
    pub fn with_window_delay(mut self, delay: Duration) -> Self {
        self.window_delay = delay;
        self
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// The windows covering `[cursor + 1, head]`, in increasing order.
    pub fn windows(&self, cursor: u64, head: u64) -> Windows {
        Windows {
            next: cursor.saturating_add(1),
            head,
            size: self.window_size,
            done: cursor >= head,
        }
    }

    /// Scan `[cursor + 1, head]`, stopping at the first window that fails.
    pub async fn scan<H>(
        &self,
        cursor: u64,
        head: u64,
        handler: &mut H,
    ) -> Result<ScanOutcome, IndexerError>
    where
        H: WindowHandler + ?Sized,
    {
        let mut outcome = ScanOutcome { windows: 0, cursor };
        for window in self.windows(cursor, head) {
            if outcome.windows > 0 && !self.window_delay.is_zero() {
                tokio::time::sleep(self.window_delay).await;
            }
            handler.process(window).await?;
            handler.commit(window).await;
            outcome.windows += 1;
            outcome.cursor = window.to;
            debug!(from = window.from, to = window.to, head, "window committed");
        }
        Ok(outcome)
    }
}

/// Iterator over the windows of one scan.
#[derive(Debug, Clone)]
pub struct Windows {
    next: u64,
    head: u64,
    size: u64,
    done: bool,
}

impl Iterator for Windows {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<BlockWindow> {
        if self.done || self.next > self.head {
            return None;
        }
        let from = self.next;
        let to = from.saturating_add(self.size - 1).min(self.head);
        if to >= self.head {
            self.done = true;
        } else {
            self.next = to + 1;
        }
        Some(BlockWindow { from, to })
    }
}
