//! Funds-claim discovery across every known campaign.
//!
//! Each run takes a fresh copy of the campaign universe. Campaigns whose
//! claim is already recorded are not queried again; the rest are queried
//! in address batches, one `eth_getLogs` per batch per window. A failed
//! batch does not hold up the others: its range and addresses are kept in
//! the state and queried again at the start of each later run until the
//! query succeeds.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fundindex_core::dedup::DedupLog;
use fundindex_core::error::IndexerError;
use fundindex_core::fetcher::RetryableFetcher;
use fundindex_core::indexer::Pipeline;
use fundindex_core::scanner::BlockWindow;
use fundindex_core::types::LogQuery;

use crate::decoder::{EventDecoder, PlatformEvent};
use crate::pipelines::campaigns::CampaignUniverse;
use crate::records::FundsClaimRecord;

pub const NAME: &str = "funds";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsState {
    /// Claims keyed by campaign address (the processed-campaign set).
    #[serde(default)]
    pub claims: DedupLog<FundsClaimRecord>,
    /// Batches whose query failed, waiting to be retried.
    #[serde(default)]
    pub failed_batches: Vec<FailedBatch>,
}

/// A block range and address batch that still has to be queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedBatch {
    pub from_block: u64,
    pub to_block: u64,
    pub campaigns: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum FundsEvent {
    Claim(FundsClaimRecord),
    BatchFailed(FailedBatch),
    BatchRecovered(FailedBatch),
}

pub struct FundsPipeline {
    universe: Arc<dyn CampaignUniverse>,
    decoder: EventDecoder,
    batch_size: usize,
    batch_delay: Duration,
    campaigns: RwLock<Vec<String>>,
}

impl FundsPipeline {
    pub fn new(universe: Arc<dyn CampaignUniverse>) -> Self {
        Self {
            universe,
            decoder: EventDecoder::new(),
            batch_size: 20,
            batch_delay: Duration::from_millis(250),
            campaigns: RwLock::new(Vec::new()),
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Campaign addresses as of the last refresh.
    pub fn campaigns(&self) -> Vec<String> {
        self.campaigns.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn pause(&self, index: usize) {
        if index > 0 && !self.batch_delay.is_zero() {
            tokio::time::sleep(self.batch_delay).await;
        }
    }

    async fn query_batch(
        &self,
        fetcher: &RetryableFetcher,
        from: u64,
        to: u64,
        batch: &[String],
    ) -> Result<Vec<FundsClaimRecord>, IndexerError> {
        let query = LogQuery::new(from, to)
            .addresses(batch.iter().cloned())
            .topic0(self.decoder.funds_claimed_topic());
        let logs = fetcher.fetch(&query).await?;

        let mut records = Vec::new();
        for log in logs.iter().filter(|l| !l.is_removed()) {
            match self.decoder.decode(log) {
                Ok(PlatformEvent::FundsClaimed(claim)) => records.push(FundsClaimRecord {
                    campaign_address: claim.campaign,
                    recipient: claim.recipient,
                    amount: claim.amount,
                    tx_hash: claim.meta.tx_hash,
                    block_number: claim.meta.block_number,
                    log_index: claim.meta.log_index,
                }),
                Ok(_) => {}
                Err(e) => warn!(tx = %log.tx_hash, error = %e, "skipping undecodable claim log"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl Pipeline for FundsPipeline {
    type State = FundsState;
    type Event = FundsEvent;

    fn name(&self) -> &str {
        NAME
    }

    async fn refresh(&self) {
        match self.universe.campaign_addresses() {
            Ok(list) if !list.is_empty() => {
                *self.campaigns.write().unwrap_or_else(|e| e.into_inner()) = list;
            }
            Ok(_) => debug!("campaign universe empty, keeping previous list"),
            Err(e) => warn!(error = %e, "campaign universe unavailable, keeping previous list"),
        }
    }

    async fn recover(&self, fetcher: &RetryableFetcher, state: &FundsState) -> Vec<FundsEvent> {
        let mut events = Vec::new();
        for (i, entry) in state.failed_batches.iter().enumerate() {
            let remaining: Vec<String> = entry
                .campaigns
                .iter()
                .filter(|c| !state.claims.contains(c))
                .cloned()
                .collect();
            if remaining.is_empty() {
                events.push(FundsEvent::BatchRecovered(entry.clone()));
                continue;
            }
            self.pause(i).await;
            match self
                .query_batch(fetcher, entry.from_block, entry.to_block, &remaining)
                .await
            {
                Ok(records) => {
                    debug!(
                        from = entry.from_block,
                        to = entry.to_block,
                        claims = records.len(),
                        "failed claim batch recovered"
                    );
                    events.extend(records.into_iter().map(FundsEvent::Claim));
                    events.push(FundsEvent::BatchRecovered(entry.clone()));
                }
                Err(e) => warn!(
                    from = entry.from_block,
                    to = entry.to_block,
                    campaigns = remaining.len(),
                    error = %e,
                    "failed claim batch still failing, keeping it"
                ),
            }
        }
        events
    }

    async fn collect(
        &self,
        fetcher: &RetryableFetcher,
        window: BlockWindow,
        state: &FundsState,
    ) -> Result<Vec<FundsEvent>, IndexerError> {
        let pending: Vec<String> = self
            .campaigns()
            .into_iter()
            .filter(|c| !state.claims.contains(c))
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for (i, batch) in pending.chunks(self.batch_size).enumerate() {
            self.pause(i).await;
            match self.query_batch(fetcher, window.from, window.to, batch).await {
                Ok(records) => events.extend(records.into_iter().map(FundsEvent::Claim)),
                Err(e) => {
                    warn!(%window, batch = i, campaigns = batch.len(), error = %e, "claim batch failed, will retry next run");
                    events.push(FundsEvent::BatchFailed(FailedBatch {
                        from_block: window.from,
                        to_block: window.to,
                        campaigns: batch.to_vec(),
                    }));
                }
            }
        }
        Ok(events)
    }

    fn apply(&self, state: &mut FundsState, event: FundsEvent) -> bool {
        match event {
            FundsEvent::Claim(record) => {
                let key = record.campaign_address.clone();
                state.claims.accept(&key, record)
            }
            FundsEvent::BatchFailed(batch) => {
                if state.failed_batches.contains(&batch) {
                    return false;
                }
                state.failed_batches.push(batch);
                true
            }
            FundsEvent::BatchRecovered(batch) => {
                match state.failed_batches.iter().position(|b| *b == batch) {
                    Some(pos) => {
                        state.failed_batches.remove(pos);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn record_count(&self, state: &FundsState) -> usize {
        state.claims.len()
    }
}
