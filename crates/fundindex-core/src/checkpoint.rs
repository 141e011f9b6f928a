//! Checkpoint manager — persists an indexer's cursor and result set so a
//! restart resumes where the last run stopped instead of re-scanning.
//!
//! Several indexers share one physical store, partitioned by indexer name.
//! A save for one name must never touch another name's partition.
//!
//! Persistence is best-effort: failed reads are treated as "no checkpoint",
//! failed writes are logged and the in-memory state stays authoritative.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cursor::Cursor;
use crate::error::IndexerError;

/// The persisted document for one indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCheckpoint {
    /// Indexer name (partition key).
    pub name: String,
    /// Last fully processed block, stored as a string.
    #[serde(with = "crate::types::u64_string")]
    pub last_processed_block: u64,
    /// Unix timestamp of the save.
    pub updated_at: i64,
    /// Indexer-specific result collection and dedup set.
    #[serde(default)]
    pub state: serde_json::Value,
}

/// Trait for storing and loading checkpoints.
///
/// Implementations include `MemoryCheckpointStore` and, in
/// `fundindex-storage`, `JsonFileStore` and `SqliteStore`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for `name`, if one exists.
    async fn load(&self, name: &str) -> Result<Option<StoredCheckpoint>, IndexerError>;

    /// Save (upsert) the checkpoint under `checkpoint.name`.
    async fn save(&self, checkpoint: StoredCheckpoint) -> Result<(), IndexerError>;

    /// Delete a checkpoint (e.g. when resetting an indexer).
    async fn delete(&self, name: &str) -> Result<(), IndexerError>;
}

/// Typed checkpoint access for one indexer.
pub struct CheckpointManager<S> {
    store: Arc<dyn CheckpointStore>,
    name: String,
    _state: PhantomData<fn() -> S>,
}

impl<S> CheckpointManager<S>
where
    S: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn CheckpointStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            _state: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the saved cursor and state. Any read or decode failure is logged
    /// and reported as "no checkpoint".
    pub async fn load(&self) -> Option<(Cursor, S)> {
        let stored = match self.store.load(&self.name).await {
            Ok(Some(cp)) => cp,
            Ok(None) => return None,
            Err(e) => {
                warn!(indexer = %self.name, error = %e, "checkpoint unreadable, cold-starting");
                return None;
            }
        };
        let state = if stored.state.is_null() {
            serde_json::from_value(serde_json::json!({}))
        } else {
            serde_json::from_value(stored.state)
        };
        match state {
            Ok(state) => Some((Cursor::new(stored.last_processed_block), state)),
            Err(e) => {
                warn!(indexer = %self.name, error = %e, "checkpoint state malformed, cold-starting");
                None
            }
        }
    }

    /// Persist `cursor` and `state`. Returns `false` if the write failed; the
    /// failure is logged and otherwise swallowed.
    pub async fn save(&self, cursor: Cursor, state: &S) -> bool {
        let state = match serde_json::to_value(state) {
            Ok(v) => v,
            Err(e) => {
                warn!(indexer = %self.name, error = %e, "checkpoint state not serializable");
                return false;
            }
        };
        let cp = StoredCheckpoint {
            name: self.name.clone(),
            last_processed_block: cursor.block_number,
            updated_at: chrono::Utc::now().timestamp(),
            state,
        };
        match self.store.save(cp).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    indexer = %self.name,
                    block = cursor.block_number,
                    error = %e,
                    "checkpoint write failed, keeping in-memory state"
                );
                false
            }
        }
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, StoredCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored checkpoint, bypassing the async trait.
    pub fn get(&self, name: &str) -> Option<StoredCheckpoint> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, name: &str) -> Result<Option<StoredCheckpoint>, IndexerError> {
        Ok(self.get(name))
    }

    async fn save(&self, checkpoint: StoredCheckpoint) -> Result<(), IndexerError> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(checkpoint.name.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), IndexerError> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Seen {
        #[serde(default)]
        keys: BTreeSet<String>,
    }

    struct BrokenStore;

    #[async_trait]
    impl CheckpointStore for BrokenStore {
        async fn load(&self, _name: &str) -> Result<Option<StoredCheckpoint>, IndexerError> {
            Err(IndexerError::Storage("disk on fire".into()))
        }
        async fn save(&self, _cp: StoredCheckpoint) -> Result<(), IndexerError> {
            Err(IndexerError::Storage("read-only filesystem".into()))
        }
        async fn delete(&self, _name: &str) -> Result<(), IndexerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mgr: CheckpointManager<Seen> = CheckpointManager::new(store.clone(), "funds");

        assert!(mgr.load().await.is_none());

        let mut seen = Seen::default();
        seen.keys.insert("0xbb".into());
        assert!(mgr.save(Cursor::new(1000), &seen).await);

        let (cursor, loaded) = mgr.load().await.unwrap();
        assert_eq!(cursor.block_number, 1000);
        assert_eq!(loaded, seen);

        let raw = store.get("funds").unwrap();
        assert_eq!(raw.state["keys"][0], "0xbb");
    }

    #[tokio::test]
    async fn partitions_are_independent() {
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let a: CheckpointManager<Seen> = CheckpointManager::new(store.clone(), "events");
        let b: CheckpointManager<Seen> = CheckpointManager::new(store.clone(), "tokens");

        a.save(Cursor::new(10), &Seen::default()).await;
        b.save(Cursor::new(20), &Seen::default()).await;
        a.save(Cursor::new(11), &Seen::default()).await;

        assert_eq!(a.load().await.unwrap().0.block_number, 11);
        assert_eq!(b.load().await.unwrap().0.block_number, 20);
    }

    #[tokio::test]
    async fn null_state_loads_as_default() {
        let store = Arc::new(MemoryCheckpointStore::new());
        store
            .save(StoredCheckpoint {
                name: "events".into(),
                last_processed_block: 5,
                updated_at: 0,
                state: serde_json::Value::Null,
            })
            .await
            .unwrap();
        let mgr: CheckpointManager<Seen> = CheckpointManager::new(store, "events");
        let (cursor, state) = mgr.load().await.unwrap();
        assert_eq!(cursor.block_number, 5);
        assert!(state.keys.is_empty());
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let mgr: CheckpointManager<Seen> = CheckpointManager::new(Arc::new(BrokenStore), "events");
        assert!(mgr.load().await.is_none());
        assert!(!mgr.save(Cursor::new(1), &Seen::default()).await);
    }
}
