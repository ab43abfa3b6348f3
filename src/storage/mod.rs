//! Storage module for persisting crawl results
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Film, country and person records
//! - Per-partition crawl progress
//! - The durable log of per-item failures

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{ItemId, Partition};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Opens (creating if needed) the database at `path`
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// One item that could not be ingested
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    /// Partition being walked, if any (single-item runs have none)
    pub partition: Option<Partition>,
    pub item_id: ItemId,
    pub message: String,
    pub worker: String,
    pub logged_at: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(
        partition: Option<Partition>,
        item_id: ItemId,
        message: impl Into<String>,
        worker: &str,
    ) -> Self {
        Self {
            partition,
            item_id,
            message: message.into(),
            worker: worker.to_string(),
            logged_at: Utc::now(),
        }
    }
}
