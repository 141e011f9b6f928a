//! Allow-listed token lifecycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fundindex_core::dedup::DedupSet;
use fundindex_core::error::IndexerError;
use fundindex_core::fetcher::RetryableFetcher;
use fundindex_core::indexer::Pipeline;
use fundindex_core::scanner::BlockWindow;
use fundindex_core::types::LogQuery;

use crate::decoder::{normalize_address, EventDecoder, PlatformEvent, TokenChange};
use crate::records::TokenRecord;

pub const NAME: &str = "tokens";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    #[serde(default)]
    pub tokens: Vec<TokenRecord>,
    /// Identities (`txhash:logindex`) of events already applied.
    #[serde(default)]
    pub seen_events: DedupSet,
}

impl TokenState {
    pub fn get(&self, token: &str) -> Option<&TokenRecord> {
        self.tokens.iter().find(|t| t.address == token)
    }
}

pub struct TokenPipeline {
    platform: String,
    decoder: EventDecoder,
}

impl TokenPipeline {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: normalize_address(platform),
            decoder: EventDecoder::new(),
        }
    }
}

/// A token event plus its identity.
pub struct TokenEvent {
    identity: String,
    change: TokenChange,
}

#[async_trait]
impl Pipeline for TokenPipeline {
    type State = TokenState;
    type Event = TokenEvent;

    fn name(&self) -> &str {
        NAME
    }

    async fn collect(
        &self,
        fetcher: &RetryableFetcher,
        window: BlockWindow,
        _state: &TokenState,
    ) -> Result<Vec<TokenEvent>, IndexerError> {
        let query = LogQuery::new(window.from, window.to)
            .address(self.platform.as_str())
            .topic0(self.decoder.token_allowed_topic())
            .topic0(self.decoder.token_disallowed_topic());
        let logs = fetcher.fetch(&query).await?;

        let mut events = Vec::new();
        for log in logs.iter().filter(|l| !l.is_removed()) {
            match self.decoder.decode(log) {
                Ok(PlatformEvent::Token(change)) => events.push(TokenEvent {
                    identity: log.identity(),
                    change,
                }),
                Ok(_) => {}
                Err(e) => warn!(tx = %log.tx_hash, error = %e, "skipping undecodable token log"),
            }
        }
        Ok(events)
    }

    fn apply(&self, state: &mut TokenState, event: TokenEvent) -> bool {
        if state.seen_events.contains(&event.identity) {
            return false;
        }
        let TokenChange { token, allowed, meta } = event.change;
        let block = meta.block_number;
        let existing = state.tokens.iter_mut().find(|t| t.address == token);
        match (existing, allowed) {
            (Some(record), true) => {
                record.status = true;
                record.added_at_block = block;
                record.removed_at_block = None;
            }
            (Some(record), false) => {
                record.status = false;
                record.removed_at_block = Some(block);
            }
            (None, true) => state.tokens.push(TokenRecord {
                address: token,
                added_at_block: block,
                removed_at_block: None,
                status: true,
            }),
            (None, false) => {
                debug!(%token, block, "disallow for unknown token ignored");
                return false;
            }
        }
        state.seen_events.insert(&event.identity);
        true
    }

    fn record_count(&self, state: &TokenState) -> usize {
        state.tokens.len()
    }
}
