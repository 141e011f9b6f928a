//! End-to-end pipeline runs against the scripted in-memory log source.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fundindex_core::testing::MockLogSource;
use fundindex_core::{
    CheckpointStore, IndexerError, IndexerInstance, IndexerSettings, LogSource,
    MemoryCheckpointStore, Pipeline, RawLog, RunOutcome, SourceError,
};
use fundindex_evm::decoder::{
    event_topic, CAMPAIGN_CREATED, FUNDS_CLAIMED, TOKEN_ALLOWED, TOKEN_DISALLOWED,
};
use fundindex_evm::{
    CampaignPipeline, CampaignUniverse, FailedBatch, FundsPipeline, IndexerBuilder, QueryFacade,
    TokenPipeline,
};

const PLATFORM: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
const CAMPAIGN_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const CAMPAIGN_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const FOUNDER: &str = "0x1111111111111111111111111111111111111111";
const USDC: &str = "0x2222222222222222222222222222222222222222";
const DAI: &str = "0x3333333333333333333333333333333333333333";

// ─── Fixtures ─────────────────────────────────────────────────────────────────

fn word(address: &str) -> String {
    format!("{:0>64}", address.trim_start_matches("0x").to_ascii_lowercase())
}

fn created(campaign: &str, block: u64, index: u64) -> RawLog {
    let mut log = MockLogSource::log(PLATFORM, block, index);
    log.topics = vec![
        event_topic(CAMPAIGN_CREATED),
        format!("0x{}", word(campaign)),
        format!("0x{}", word(FOUNDER)),
    ];
    log.data = format!("0x{}{:064x}", word(USDC), 5_000u128);
    log
}

fn claimed(campaign: &str, amount: u128, block: u64) -> RawLog {
    let mut log = MockLogSource::log(campaign, block, 0);
    log.topics = vec![event_topic(FUNDS_CLAIMED), format!("0x{}", word(FOUNDER))];
    log.data = format!("0x{amount:064x}");
    log
}

fn token_event(signature: &str, token: &str, block: u64) -> RawLog {
    let mut log = MockLogSource::log(PLATFORM, block, 1);
    log.topics = vec![event_topic(signature), format!("0x{}", word(token))];
    log
}

fn settings() -> IndexerSettings {
    IndexerBuilder::new()
        .start_block(Some(101))
        .max_attempts(2)
        .base_backoff(Duration::from_millis(1))
        .build_settings()
}

fn campaigns_indexer(
    source: &Arc<MockLogSource>,
    store: &Arc<MemoryCheckpointStore>,
) -> Arc<IndexerInstance<CampaignPipeline>> {
    Arc::new(IndexerInstance::new(
        CampaignPipeline::new(PLATFORM),
        settings(),
        source.clone(),
        store.clone(),
    ))
}

fn funds_indexer(
    universe: Arc<dyn CampaignUniverse>,
    batch_size: usize,
    source: &Arc<MockLogSource>,
    store: &Arc<MemoryCheckpointStore>,
) -> Arc<IndexerInstance<FundsPipeline>> {
    let pipeline = FundsPipeline::new(universe)
        .with_batch_size(batch_size)
        .with_batch_delay(Duration::ZERO);
    Arc::new(IndexerInstance::new(pipeline, settings(), source.clone(), store.clone()))
}

/// A fixed campaign list.
struct Fixed(Vec<String>);

impl CampaignUniverse for Fixed {
    fn campaign_addresses(&self) -> Result<Vec<String>, IndexerError> {
        Ok(self.0.clone())
    }
}

/// Replays queued answers, then reports the universe as unavailable.
struct Flaky(Mutex<VecDeque<Result<Vec<String>, IndexerError>>>);

impl CampaignUniverse for Flaky {
    fn campaign_addresses(&self) -> Result<Vec<String>, IndexerError> {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(IndexerError::Other("campaign indexer gone".into())))
    }
}

// ─── Campaigns ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn campaigns_are_discovered_window_by_window() {
    let source = Arc::new(MockLogSource::new(125));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(created(CAMPAIGN_A, 105, 0));
    source.add_log(created(CAMPAIGN_B, 118, 2));
    source.set_call(CAMPAIGN_A, Ok("0x00ff".into()));

    let campaigns = campaigns_indexer(&source, &store);
    let outcome = campaigns.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { windows: 3, accepted: 2, cursor: 125 }));

    let ranges: Vec<(u64, u64)> = source
        .queries()
        .iter()
        .map(|q| (q.from_block, q.to_block))
        .collect();
    assert_eq!(ranges, vec![(101, 110), (111, 120), (121, 125)]);
    assert!(source.queries().iter().all(|q| q.addresses == vec![PLATFORM.to_string()]));

    let state = campaigns.snapshot();
    let records = state.campaigns.records();
    assert_eq!(records[0].campaign_address, CAMPAIGN_A);
    assert_eq!(records[0].founder, FOUNDER);
    assert_eq!(records[0].token, USDC);
    assert_eq!(records[0].goal, "5000");
    assert_eq!(records[0].summary.as_deref(), Some("0x00ff"));
    // getSummary reverted for B; the record still lands.
    assert_eq!(records[1].campaign_address, CAMPAIGN_B);
    assert_eq!(records[1].summary, None);

    let cp = store.get("events").unwrap();
    assert_eq!(cp.last_processed_block, 125);
}

#[tokio::test]
async fn restart_resumes_without_duplicates() {
    let source = Arc::new(MockLogSource::new(125));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(created(CAMPAIGN_A, 105, 0));
    campaigns_indexer(&source, &store).run().await.unwrap();

    // Same creation event served again by the provider in the resumed range.
    source.set_head(130);
    source.add_log(created(CAMPAIGN_A, 127, 0));
    source.add_log(created(CAMPAIGN_B, 128, 0));

    let restarted = campaigns_indexer(&source, &store);
    restarted.run().await.unwrap();
    let last = source.queries().last().cloned().unwrap();
    assert_eq!((last.from_block, last.to_block), (126, 130));

    let state = restarted.snapshot();
    let addresses: Vec<&str> = state
        .campaigns
        .records()
        .iter()
        .map(|c| c.campaign_address.as_str())
        .collect();
    assert_eq!(addresses, vec![CAMPAIGN_A, CAMPAIGN_B]);
}

#[tokio::test]
async fn undecodable_and_removed_logs_are_skipped() {
    let source = Arc::new(MockLogSource::new(110));
    let store = Arc::new(MemoryCheckpointStore::new());
    let mut broken = created(CAMPAIGN_A, 103, 0);
    broken.data = "0x1234".into();
    let mut reorged = created(CAMPAIGN_A, 104, 0);
    reorged.removed = Some(true);
    source.add_log(broken);
    source.add_log(reorged);
    source.add_log(created(CAMPAIGN_B, 106, 1));

    let campaigns = campaigns_indexer(&source, &store);
    campaigns.run().await.unwrap();

    let state = campaigns.snapshot();
    assert_eq!(state.campaigns.len(), 1);
    assert_eq!(state.campaigns.records()[0].campaign_address, CAMPAIGN_B);
    assert_eq!(campaigns.cursor(), 110);
}

#[tokio::test]
async fn failed_window_keeps_earlier_windows() {
    let source = Arc::new(MockLogSource::new(125));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(created(CAMPAIGN_A, 105, 0));
    source.add_log(created(CAMPAIGN_B, 115, 0));
    source.fail_at(111, SourceError::Throttled("compute units exceeded".into()));

    let campaigns = campaigns_indexer(&source, &store);
    let err = campaigns.run().await.unwrap_err();
    assert!(matches!(err, IndexerError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(campaigns.cursor(), 110);
    assert_eq!(campaigns.snapshot().campaigns.len(), 1);
    assert!(campaigns.status().last_error.is_some());

    source.clear_failures();
    campaigns.run().await.unwrap();
    assert_eq!(campaigns.cursor(), 125);
    assert_eq!(campaigns.snapshot().campaigns.len(), 2);
}

// ─── Funds ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn claims_follow_the_campaign_indexer() {
    let source = Arc::new(MockLogSource::new(125));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(created(CAMPAIGN_A, 102, 0));
    source.add_log(created(CAMPAIGN_B, 103, 0));
    source.add_log(claimed(CAMPAIGN_B, 7_000, 119));

    let campaigns = campaigns_indexer(&source, &store);
    campaigns.run().await.unwrap();

    let funds = funds_indexer(campaigns.clone(), 20, &source, &store);
    funds.run().await.unwrap();

    let state = funds.snapshot();
    let claims = state.claims.records();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].campaign_address, CAMPAIGN_B);
    assert_eq!(claims[0].recipient, FOUNDER);
    assert_eq!(claims[0].amount, "7000");
    assert_eq!(funds.cursor(), 125);
}

#[tokio::test]
async fn claimed_campaigns_are_not_queried_again() {
    let source = Arc::new(MockLogSource::new(110));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(claimed(CAMPAIGN_A, 1, 105));
    let universe = Arc::new(Fixed(vec![CAMPAIGN_A.into(), CAMPAIGN_B.into()]));

    let funds = funds_indexer(universe, 20, &source, &store);
    funds.run().await.unwrap();
    assert_eq!(funds.snapshot().claims.len(), 1);

    source.set_head(120);
    funds.run().await.unwrap();
    let last = source.queries().last().cloned().unwrap();
    assert_eq!((last.from_block, last.to_block), (111, 120));
    assert_eq!(last.addresses, vec![CAMPAIGN_B.to_string()]);
}

#[tokio::test]
async fn overlapping_batches_record_a_claim_once() {
    let source = Arc::new(MockLogSource::new(110));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(claimed(CAMPAIGN_A, 9, 104));
    let universe = Arc::new(Fixed(vec![CAMPAIGN_A.into(), CAMPAIGN_A.into()]));

    let funds = funds_indexer(universe, 1, &source, &store);
    let outcome = funds.run().await.unwrap();

    assert_eq!(source.queries().len(), 2);
    assert!(matches!(outcome, RunOutcome::Completed { accepted: 1, .. }));
    assert_eq!(funds.snapshot().claims.len(), 1);
}

#[tokio::test]
async fn failed_batch_does_not_block_the_others() {
    let source = Arc::new(MockLogSource::new(110));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(claimed(CAMPAIGN_A, 1, 102));
    source.add_log(claimed(CAMPAIGN_B, 2, 108));
    source.push_logs(Err(SourceError::from_rpc(-32602, "invalid params")));
    let universe = Arc::new(Fixed(vec![CAMPAIGN_A.into(), CAMPAIGN_B.into()]));

    let funds = funds_indexer(universe, 1, &source, &store);
    funds.run().await.unwrap();

    let state = funds.snapshot();
    assert_eq!(state.claims.len(), 1);
    assert_eq!(state.claims.records()[0].campaign_address, CAMPAIGN_B);
    assert_eq!(funds.cursor(), 110);
}

#[tokio::test]
async fn failed_batch_is_retried_on_a_later_run() {
    let source = Arc::new(MockLogSource::new(110));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(claimed(CAMPAIGN_A, 1, 102));
    source.add_log(claimed(CAMPAIGN_B, 2, 108));
    source.push_logs(Err(SourceError::from_rpc(-32602, "invalid params")));
    source.push_logs(Err(SourceError::from_rpc(-32602, "invalid params")));
    let universe = Arc::new(Fixed(vec![CAMPAIGN_A.into(), CAMPAIGN_B.into()]));

    let funds = funds_indexer(universe.clone(), 1, &source, &store);
    funds.run().await.unwrap();
    let state = funds.snapshot();
    assert_eq!(state.claims.len(), 1);
    assert_eq!(
        state.failed_batches,
        vec![FailedBatch { from_block: 101, to_block: 110, campaigns: vec![CAMPAIGN_A.into()] }]
    );

    // Fresh process: the persisted batch is retried first and fails again.
    source.set_head(120);
    let restarted = funds_indexer(universe, 1, &source, &store);
    restarted.run().await.unwrap();
    assert_eq!(restarted.snapshot().claims.len(), 1);
    assert_eq!(restarted.snapshot().failed_batches.len(), 1);
    assert_eq!(restarted.cursor(), 120);

    source.set_head(130);
    restarted.run().await.unwrap();
    let state = restarted.snapshot();
    assert_eq!(state.claims.len(), 2);
    assert!(state.claims.keys().contains(CAMPAIGN_A));
    let claim_a = state
        .claims
        .records()
        .iter()
        .find(|c| c.campaign_address == CAMPAIGN_A)
        .unwrap();
    assert_eq!(claim_a.block_number, 102);
    assert!(state.failed_batches.is_empty());
    assert_eq!(restarted.cursor(), 130);

    let retries = source
        .queries()
        .iter()
        .filter(|q| q.from_block == 101 && q.to_block == 110 && q.addresses == [CAMPAIGN_A])
        .count();
    assert_eq!(retries, 3);

    // The cleared retry list is what a later process sees.
    let reloaded = funds_indexer(Arc::new(Fixed(Vec::new())), 1, &source, &store);
    reloaded.run().await.unwrap();
    assert_eq!(reloaded.snapshot().claims.len(), 2);
    assert!(reloaded.snapshot().failed_batches.is_empty());
}

#[tokio::test]
async fn duplicate_claim_after_restart_is_discarded() {
    let source = Arc::new(MockLogSource::new(110));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(claimed(CAMPAIGN_B, 5, 104));
    let universe = Arc::new(Fixed(vec![CAMPAIGN_A.into(), CAMPAIGN_B.into()]));
    funds_indexer(universe.clone(), 20, &source, &store).run().await.unwrap();

    // After a restart the provider hands back B's claim again while A is
    // still pending.
    source.set_head(120);
    source.push_logs(Ok(vec![claimed(CAMPAIGN_B, 5, 104)]));
    let restarted = funds_indexer(universe, 20, &source, &store);
    let outcome = restarted.run().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { accepted: 0, cursor: 120, .. }));
    let state = restarted.snapshot();
    assert_eq!(state.claims.len(), 1);
    assert_eq!(state.claims.records()[0].campaign_address, CAMPAIGN_B);
    assert!(state.claims.keys().contains(CAMPAIGN_B));
}

#[tokio::test]
async fn empty_universe_issues_no_queries() {
    let source = Arc::new(MockLogSource::new(125));
    let store = Arc::new(MemoryCheckpointStore::new());
    let funds = funds_indexer(Arc::new(Fixed(vec![])), 20, &source, &store);

    let outcome = funds.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { windows: 3, accepted: 0, cursor: 125 }));
    assert!(source.queries().is_empty());
}

#[tokio::test]
async fn universe_failure_keeps_previous_list() {
    let universe = Arc::new(Flaky(Mutex::new(VecDeque::from([
        Ok(vec![CAMPAIGN_A.to_string()]),
        Ok(vec![]),
    ]))));
    let pipeline = FundsPipeline::new(universe);

    pipeline.refresh().await;
    assert_eq!(pipeline.campaigns(), vec![CAMPAIGN_A.to_string()]);
    pipeline.refresh().await;
    assert_eq!(pipeline.campaigns(), vec![CAMPAIGN_A.to_string()]);
    pipeline.refresh().await;
    assert_eq!(pipeline.campaigns(), vec![CAMPAIGN_A.to_string()]);
}

// ─── Tokens ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn token_lifecycle_updates_in_place() {
    let source = Arc::new(MockLogSource::new(125));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(token_event(TOKEN_ALLOWED, USDC, 102));
    source.add_log(token_event(TOKEN_ALLOWED, DAI, 104));
    source.add_log(token_event(TOKEN_DISALLOWED, USDC, 108));
    source.add_log(token_event(TOKEN_DISALLOWED, DAI, 112));
    source.add_log(token_event(TOKEN_ALLOWED, DAI, 121));

    let tokens = Arc::new(IndexerInstance::new(
        TokenPipeline::new(PLATFORM),
        settings(),
        source.clone() as Arc<dyn LogSource>,
        store.clone() as Arc<dyn CheckpointStore>,
    ));
    tokens.run().await.unwrap();

    let state = tokens.snapshot();
    assert_eq!(state.tokens.len(), 2);
    let usdc = state.get(USDC).unwrap();
    assert!(!usdc.status);
    assert_eq!(usdc.added_at_block, 102);
    assert_eq!(usdc.removed_at_block, Some(108));
    let dai = state.get(DAI).unwrap();
    assert!(dai.status);
    assert_eq!(dai.added_at_block, 121);
    assert_eq!(dai.removed_at_block, None);
    assert_eq!(state.seen_events.len(), 5);
}

#[tokio::test]
async fn replayed_token_events_are_ignored() {
    let source = Arc::new(MockLogSource::new(110));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(token_event(TOKEN_ALLOWED, USDC, 102));
    // The provider serves the same log twice.
    source.add_log(token_event(TOKEN_ALLOWED, USDC, 102));
    source.add_log(token_event(TOKEN_DISALLOWED, DAI, 103));

    let tokens = IndexerInstance::new(TokenPipeline::new(PLATFORM), settings(), source.clone(), store.clone());
    let outcome = tokens.run().await.unwrap();
    // Disallowing a token never seen allowed changes nothing.
    assert!(matches!(outcome, RunOutcome::Completed { accepted: 1, .. }));
    assert_eq!(tokens.snapshot().tokens.len(), 1);
    assert_eq!(tokens.snapshot().seen_events.len(), 1);

    source.set_head(115);
    let resumed = IndexerInstance::new(TokenPipeline::new(PLATFORM), settings(), source, store);
    resumed.run().await.unwrap();
    assert_eq!(resumed.snapshot().tokens.len(), 1);
    assert!(resumed.snapshot().get(USDC).unwrap().status);
}

// ─── Facade ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn facade_serves_sorted_snapshots() {
    let source = Arc::new(MockLogSource::new(125));
    let store = Arc::new(MemoryCheckpointStore::new());
    source.add_log(created(CAMPAIGN_A, 102, 0));
    source.add_log(created(CAMPAIGN_B, 117, 0));
    source.add_log(claimed(CAMPAIGN_A, 3, 110));
    source.add_log(claimed(CAMPAIGN_B, 4, 120));
    source.add_log(token_event(TOKEN_ALLOWED, USDC, 101));
    source.add_log(token_event(TOKEN_ALLOWED, DAI, 103));
    source.add_log(token_event(TOKEN_DISALLOWED, DAI, 109));

    let campaigns = campaigns_indexer(&source, &store);
    let funds = funds_indexer(campaigns.clone(), 20, &source, &store);
    let tokens = Arc::new(IndexerInstance::new(
        TokenPipeline::new(PLATFORM),
        settings(),
        source.clone() as Arc<dyn LogSource>,
        store.clone() as Arc<dyn CheckpointStore>,
    ));
    campaigns.run().await.unwrap();
    funds.run().await.unwrap();
    tokens.run().await.unwrap();

    let facade = QueryFacade::new(campaigns, funds, tokens);

    let order: Vec<String> = facade.campaigns().into_iter().map(|c| c.campaign_address).collect();
    assert_eq!(order, vec![CAMPAIGN_B.to_string(), CAMPAIGN_A.to_string()]);

    let found = facade.campaign(&CAMPAIGN_A.to_uppercase().replace("0X", "0x")).unwrap();
    assert_eq!(found.campaign_address, CAMPAIGN_A);
    assert!(facade.campaign(DAI).is_none());

    let claims: Vec<u64> = facade.funds().iter().map(|f| f.block_number).collect();
    assert_eq!(claims, vec![120, 110]);

    assert_eq!(facade.tokens().len(), 2);
    let allowed: Vec<String> = facade.allowed_tokens().into_iter().map(|t| t.address).collect();
    assert_eq!(allowed, vec![USDC.to_string()]);

    let names: Vec<String> = facade.status().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["events", "funds", "tokens"]);
    assert!(facade.status().iter().all(|s| s.last_processed_block == 125));
}
