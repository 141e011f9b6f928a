//! Campaign discovery from the platform's creation events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fundindex_core::dedup::DedupLog;
use fundindex_core::error::IndexerError;
use fundindex_core::fetcher::RetryableFetcher;
use fundindex_core::indexer::{IndexerInstance, Pipeline};
use fundindex_core::scanner::BlockWindow;
use fundindex_core::types::LogQuery;

use crate::decoder::{normalize_address, selector, EventDecoder, PlatformEvent, GET_SUMMARY};
use crate::records::CampaignRecord;

pub const NAME: &str = "events";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignState {
    #[serde(default)]
    pub campaigns: DedupLog<CampaignRecord>,
}

/// Read access to the set of known campaign addresses.
pub trait CampaignUniverse: Send + Sync {
    fn campaign_addresses(&self) -> Result<Vec<String>, IndexerError>;
}

impl CampaignUniverse for IndexerInstance<CampaignPipeline> {
    fn campaign_addresses(&self) -> Result<Vec<String>, IndexerError> {
        Ok(self
            .snapshot()
            .campaigns
            .records()
            .iter()
            .map(|c| c.campaign_address.clone())
            .collect())
    }
}

pub struct CampaignPipeline {
    platform: String,
    decoder: EventDecoder,
    read_summary: bool,
}

impl CampaignPipeline {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: normalize_address(platform),
            decoder: EventDecoder::new(),
            read_summary: true,
        }
    }

    /// Disable the `getSummary()` read at discovery.
    pub fn without_summary(mut self) -> Self {
        self.read_summary = false;
        self
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    async fn summary(&self, fetcher: &RetryableFetcher, campaign: &str) -> Option<String> {
        if !self.read_summary {
            return None;
        }
        match fetcher.call(campaign, &selector(GET_SUMMARY)).await {
            Ok(data) if data.len() > 2 => Some(data),
            Ok(_) => None,
            Err(e) => {
                debug!(campaign, error = %e, "summary unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl Pipeline for CampaignPipeline {
    type State = CampaignState;
    type Event = CampaignRecord;

    fn name(&self) -> &str {
        NAME
    }

    async fn collect(
        &self,
        fetcher: &RetryableFetcher,
        window: BlockWindow,
        state: &CampaignState,
    ) -> Result<Vec<CampaignRecord>, IndexerError> {
        let query = LogQuery::new(window.from, window.to)
            .address(self.platform.as_str())
            .topic0(self.decoder.campaign_created_topic());
        let logs = fetcher.fetch(&query).await?;

        let mut records = Vec::new();
        for log in logs.iter().filter(|l| !l.is_removed()) {
            let created = match self.decoder.decode(log) {
                Ok(PlatformEvent::CampaignCreated(c)) => c,
                Ok(_) => continue,
                Err(e) => {
                    warn!(tx = %log.tx_hash, error = %e, "skipping undecodable campaign log");
                    continue;
                }
            };
            if state.campaigns.contains(&created.campaign) {
                continue;
            }
            let summary = self.summary(fetcher, &created.campaign).await;
            records.push(CampaignRecord {
                campaign_address: created.campaign,
                founder: created.founder,
                token: created.token,
                goal: created.goal,
                tx_hash: created.meta.tx_hash,
                block_number: created.meta.block_number,
                log_index: created.meta.log_index,
                summary,
            });
        }
        Ok(records)
    }

    fn apply(&self, state: &mut CampaignState, record: CampaignRecord) -> bool {
        let key = record.campaign_address.clone();
        state.campaigns.accept(&key, record)
    }

    fn record_count(&self, state: &CampaignState) -> usize {
        state.campaigns.len()
    }
}
