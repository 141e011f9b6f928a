//! SQLite checkpoint store.
//!
//! One row per indexer name. The block number is stored as TEXT so values
//! above `i64::MAX` round-trip; the indexer state is stored as JSON text.
//!
//! # Usage
//! ```rust,no_run
//! use fundindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("./indexer-state.db").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use fundindex_core::checkpoint::{CheckpointStore, StoredCheckpoint};
use fundindex_core::error::IndexerError;

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed checkpoint store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./state.db"`) or a full
    /// SQLite URL (`"sqlite:./state.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS indexer_checkpoints (
                name                 TEXT    NOT NULL PRIMARY KEY,
                last_processed_block TEXT    NOT NULL,
                state_json           TEXT    NOT NULL,
                updated_at           INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load(&self, name: &str) -> Result<Option<StoredCheckpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT name, last_processed_block, state_json, updated_at
             FROM indexer_checkpoints WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let block: String = row.get("last_processed_block");
        let state: String = row.get("state_json");
        Ok(Some(StoredCheckpoint {
            name: row.get("name"),
            last_processed_block: block
                .parse()
                .map_err(|e| IndexerError::Storage(format!("bad block number {block:?}: {e}")))?,
            updated_at: row.get("updated_at"),
            state: serde_json::from_str(&state)?,
        }))
    }

    async fn save(&self, checkpoint: StoredCheckpoint) -> Result<(), IndexerError> {
        let state = serde_json::to_string(&checkpoint.state)?;
        sqlx::query(
            "INSERT OR REPLACE INTO indexer_checkpoints
             (name, last_processed_block, state_json, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&checkpoint.name)
        .bind(checkpoint.last_processed_block.to_string())
        .bind(&state)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            indexer = %checkpoint.name,
            block = checkpoint.last_processed_block,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM indexer_checkpoints WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}
