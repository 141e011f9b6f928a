//! fundindex-storage — durable checkpoint stores for fundindex.
//!
//! Backends:
//! - [`json_file`] — one shared JSON document, partitioned by indexer name (default)
//! - [`sqlite`] — SQLite via `sqlx`, one row per indexer (feature `sqlite`)
//!
//! The in-memory store used by tests lives in `fundindex-core`.

#[cfg(feature = "json-file")]
pub mod json_file;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "json-file")]
pub use json_file::JsonFileStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
