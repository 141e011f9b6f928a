//! Shared JSON-file checkpoint store.
//!
//! The file holds one object keyed by indexer name:
//!
//! ```json
//! {
//!   "events": { "name": "events", "lastProcessedBlock": "6120450", "updatedAt": 1718000000, "state": { ... } },
//!   "funds":  { ... },
//!   "tokens": { ... }
//! }
//! ```
//!
//! Every save re-reads the file, replaces only its own partition and writes
//! the whole document to a sibling temp file that is then renamed over the
//! original. Other partitions are carried over verbatim, even ones this
//! process cannot parse.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use fundindex_core::checkpoint::{CheckpointStore, StoredCheckpoint};
use fundindex_core::error::IndexerError;

/// Checkpoint store backed by a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-merge-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoints.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Raw file contents, `None` if the file does not exist yet.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>, IndexerError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IndexerError::Storage(format!("{}: {e}", self.path.display()))),
        }
    }

    fn parse_document(&self, bytes: &[u8]) -> Result<Map<String, Value>, IndexerError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(IndexerError::Storage(format!(
                "{}: top-level value is not an object",
                self.path.display()
            ))),
            Err(e) => Err(IndexerError::Storage(format!("{}: {e}", self.path.display()))),
        }
    }

    async fn read_document(&self) -> Result<Map<String, Value>, IndexerError> {
        match self.read_bytes().await? {
            Some(bytes) => self.parse_document(&bytes),
            None => Ok(Map::new()),
        }
    }

    /// Read the document for a write. A document that is present but does
    /// not parse is replaced rather than blocking every future save. I/O
    /// errors fail the write so the file is left untouched.
    async fn read_for_update(&self) -> Result<Map<String, Value>, IndexerError> {
        let Some(bytes) = self.read_bytes().await? else {
            return Ok(Map::new());
        };
        match self.parse_document(&bytes) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                warn!(error = %e, "checkpoint file corrupt, rewriting from scratch");
                Ok(Map::new())
            }
        }
    }

    async fn write_document(&self, doc: &Map<String, Value>) -> Result<(), IndexerError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexerError::Storage(format!("{}: {e}", parent.display())))?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| IndexerError::Storage(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| IndexerError::Storage(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for JsonFileStore {
    async fn load(&self, name: &str) -> Result<Option<StoredCheckpoint>, IndexerError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        match doc.remove(name) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, checkpoint: StoredCheckpoint) -> Result<(), IndexerError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_for_update().await?;
        let name = checkpoint.name.clone();
        let block = checkpoint.last_processed_block;
        doc.insert(name.clone(), serde_json::to_value(checkpoint)?);
        self.write_document(&doc).await?;
        debug!(indexer = %name, block, path = %self.path.display(), "checkpoint written");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), IndexerError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_for_update().await?;
        if doc.remove(name).is_some() {
            self.write_document(&doc).await?;
        }
        Ok(())
    }
}
