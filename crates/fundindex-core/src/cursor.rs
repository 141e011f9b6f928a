//! Indexer cursor — the last block an indexer has fully processed.

use serde::{Deserialize, Serialize};

/// The indexer's current position in the chain.
///
/// A cursor only ever moves forward: [`Cursor::advance`] ignores targets at
/// or below the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Last block number that was fully processed.
    #[serde(with = "crate::types::u64_string")]
    pub block_number: u64,
}

impl Cursor {
    pub fn new(block_number: u64) -> Self {
        Self { block_number }
    }

    /// Cold-start position when no checkpoint exists.
    ///
    /// An explicit `start_block` is the first block to scan, so the cursor
    /// sits one below it. Otherwise the cursor trails the head by `lookback`.
    pub fn cold_start(head: u64, lookback: u64, start_block: Option<u64>) -> Self {
        let block_number = match start_block {
            Some(start) => start.saturating_sub(1),
            None => head.saturating_sub(lookback),
        };
        Self { block_number }
    }

    /// Move forward to `block_number`. Returns `false` (and leaves the cursor
    /// untouched) if that would move it backwards or nowhere.
    pub fn advance(&mut self, block_number: u64) -> bool {
        if block_number <= self.block_number {
            return false;
        }
        self.block_number = block_number;
        true
    }

    /// Returns the next block to process (cursor + 1).
    pub fn next_block(&self) -> u64 {
        self.block_number.saturating_add(1)
    }

    /// Returns `true` if there is nothing left to scan up to `head`.
    pub fn caught_up(&self, head: u64) -> bool {
        self.block_number >= head
    }
}
