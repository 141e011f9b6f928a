//! Scripted in-memory [`LogSource`] for tests.
//!
//! Serves logs from a simulated chain, filtered the way a node filters
//! `eth_getLogs`. Scripted responses queued with [`MockLogSource::push_logs`]
//! take precedence, and [`MockLogSource::fail_at`] makes every query starting
//! at a given block fail.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::source::{LogSource, SourceError};
use crate::types::{LogQuery, RawLog};

type LogsResult = Result<Vec<RawLog>, SourceError>;

#[derive(Default)]
pub struct MockLogSource {
    head: AtomicU64,
    chain: Mutex<Vec<RawLog>>,
    scripted: Mutex<VecDeque<LogsResult>>,
    failures: Mutex<HashMap<u64, SourceError>>,
    calls: Mutex<HashMap<String, Result<String, SourceError>>>,
    queries: Mutex<Vec<LogQuery>>,
}

impl MockLogSource {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            ..Default::default()
        }
    }

    /// A bare log at `block` / `index` emitted by `address`.
    pub fn log(address: &str, block: u64, index: u64) -> RawLog {
        RawLog {
            address: address.to_string(),
            topics: vec![],
            data: "0x".into(),
            block_number: format!("0x{block:x}"),
            tx_hash: format!("0x{block:064x}"),
            log_index: format!("0x{index:x}"),
            removed: None,
        }
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Add a log to the simulated chain.
    pub fn add_log(&self, log: RawLog) {
        self.chain.lock().unwrap().push(log);
    }

    /// Queue a response for the next `get_logs` call.
    pub fn push_logs(&self, result: LogsResult) {
        self.scripted.lock().unwrap().push_back(result);
    }

    /// Fail every query whose `from_block` equals `from_block`.
    pub fn fail_at(&self, from_block: u64, err: SourceError) {
        self.failures.lock().unwrap().insert(from_block, err);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Script the result of `eth_call` against `to`.
    pub fn set_call(&self, to: &str, result: Result<String, SourceError>) {
        self.calls
            .lock()
            .unwrap()
            .insert(to.to_ascii_lowercase(), result);
    }

    /// Every `get_logs` query received so far, in order.
    pub fn queries(&self) -> Vec<LogQuery> {
        self.queries.lock().unwrap().clone()
    }

    fn matches(query: &LogQuery, log: &RawLog) -> bool {
        let block = log.block_number_u64().unwrap_or(0);
        let in_range = block >= query.from_block && block <= query.to_block;
        let address_ok = query.addresses.is_empty()
            || query
                .addresses
                .iter()
                .any(|a| a.eq_ignore_ascii_case(&log.address));
        let topic_ok = query.topics.is_empty()
            || log
                .topics
                .first()
                .is_some_and(|t| query.topics.iter().any(|q| q.eq_ignore_ascii_case(t)));
        in_range && address_ok && topic_ok
    }
}

#[async_trait]
impl LogSource for MockLogSource {
    async fn head_block_number(&self) -> Result<u64, SourceError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, SourceError> {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(scripted) = self.scripted.lock().unwrap().pop_front() {
            return scripted;
        }
        if let Some(err) = self.failures.lock().unwrap().get(&query.from_block) {
            return Err(err.clone());
        }
        let mut logs: Vec<RawLog> = self
            .chain
            .lock()
            .unwrap()
            .iter()
            .filter(|l| Self::matches(query, l))
            .cloned()
            .collect();
        logs.sort_by_key(|l| (l.block_number_u64(), l.log_index_u64()));
        Ok(logs)
    }

    async fn call(&self, to: &str, _data: &str) -> Result<String, SourceError> {
        self.calls
            .lock()
            .unwrap()
            .get(&to.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| Err(SourceError::from_rpc(-32000, "execution reverted")))
    }
}
