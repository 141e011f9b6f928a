//! Read-only query surface over the three indexers.
//!
//! Every read serves the last published snapshot; none of them waits on a
//! run in progress.

use std::sync::Arc;

use fundindex_core::indexer::{IndexerInstance, IndexerStatus};

use crate::decoder::normalize_address;
use crate::pipelines::{CampaignPipeline, FundsPipeline, TokenPipeline};
use crate::records::{CampaignRecord, FundsClaimRecord, TokenRecord};

#[derive(Clone)]
pub struct QueryFacade {
    campaigns: Arc<IndexerInstance<CampaignPipeline>>,
    funds: Arc<IndexerInstance<FundsPipeline>>,
    tokens: Arc<IndexerInstance<TokenPipeline>>,
}

impl QueryFacade {
    pub fn new(
        campaigns: Arc<IndexerInstance<CampaignPipeline>>,
        funds: Arc<IndexerInstance<FundsPipeline>>,
        tokens: Arc<IndexerInstance<TokenPipeline>>,
    ) -> Self {
        Self {
            campaigns,
            funds,
            tokens,
        }
    }

    /// All campaigns, most recent first.
    pub fn campaigns(&self) -> Vec<CampaignRecord> {
        let mut out = self.campaigns.snapshot().campaigns.records().to_vec();
        out.sort_by(|a, b| (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index)));
        out
    }

    pub fn campaign(&self, address: &str) -> Option<CampaignRecord> {
        let address = normalize_address(address);
        self.campaigns
            .snapshot()
            .campaigns
            .records()
            .iter()
            .find(|c| c.campaign_address == address)
            .cloned()
    }

    /// Every token ever allowed, including disallowed ones.
    pub fn tokens(&self) -> Vec<TokenRecord> {
        self.tokens.snapshot().tokens.clone()
    }

    pub fn allowed_tokens(&self) -> Vec<TokenRecord> {
        self.tokens
            .snapshot()
            .tokens
            .iter()
            .filter(|t| t.status)
            .cloned()
            .collect()
    }

    /// All funds claims, most recent first.
    pub fn funds(&self) -> Vec<FundsClaimRecord> {
        let mut out = self.funds.snapshot().claims.records().to_vec();
        out.sort_by(|a, b| (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index)));
        out
    }

    pub fn status(&self) -> Vec<IndexerStatus> {
        vec![
            self.campaigns.status(),
            self.funds.status(),
            self.tokens.status(),
        ]
    }
}
