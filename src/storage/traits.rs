//! Storage traits and error types
//!
//! This module defines the trait interface the crawl controller persists
//! through, and the associated error type.

use crate::state::{CrawlProgress, ItemId, Partition};
use crate::storage::ErrorEntry;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines every persistence operation the crawl controller needs.
/// All writes are expected to be durable when the call returns, since a
/// killed worker resumes from whatever was last saved.
pub trait Storage {
    /// Record type produced by the matching record builder
    type Record;

    // ===== Records =====

    /// Returns true if a record with this id is already stored
    fn record_exists(&self, id: ItemId) -> StorageResult<bool>;

    /// Inserts or replaces a record
    ///
    /// Storing the same record twice must leave the store as if it had been
    /// stored once.
    fn upsert(&mut self, record: &Self::Record) -> StorageResult<()>;

    // ===== Error Log =====

    /// Appends an entry to the failure log
    fn log_error(&mut self, entry: &ErrorEntry) -> StorageResult<()>;

    // ===== Progress =====

    /// Loads the saved progress of a partition
    fn load_progress(&self, partition: &Partition) -> StorageResult<Option<CrawlProgress>>;

    /// Saves the progress of a partition, replacing the previous record
    fn save_progress(&mut self, progress: &CrawlProgress) -> StorageResult<()>;

    /// Lists the progress of every partition ever crawled, in partition order
    fn list_progress(&self) -> StorageResult<Vec<CrawlProgress>>;
}
