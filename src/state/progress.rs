//! Per-partition crawl progress
//!
//! This is the record that makes a crawl resumable: it is rewritten after
//! every processed item and read back when a worker restarts.

use crate::state::{ItemId, Partition};
use chrono::{DateTime, Utc};

/// Whether a partition walk has reached its last page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionStatus {
    /// Pages remain (or the worker was interrupted)
    InProgress,

    /// Every listing page has been walked
    Complete,
}

impl PartitionStatus {
    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Progress of one partition
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlProgress {
    /// Partition this record belongs to
    pub partition: Partition,

    /// Listing page currently being (or last) processed
    pub page: u32,

    /// Number of listing pages reported by the remote site
    pub pages_total: u32,

    /// Number of items reported by the remote site
    pub items_total: u64,

    /// Items ingested (or already present, in update mode) so far
    pub items_done: u64,

    /// Last item identifier processed, successfully or not
    pub last_item_id: Option<ItemId>,

    /// Identity of the worker that last wrote this record
    pub worker: String,

    pub status: PartitionStatus,

    pub updated_at: DateTime<Utc>,
}

impl CrawlProgress {
    /// Creates a blank record positioned on the first page
    pub fn new(partition: Partition, worker: &str) -> Self {
        Self {
            partition,
            page: 1,
            pages_total: 0,
            items_total: 0,
            items_done: 0,
            last_item_id: None,
            worker: worker.to_string(),
            status: PartitionStatus::InProgress,
            updated_at: Utc::now(),
        }
    }

    /// Returns true once the remote totals have been recorded
    pub fn has_totals(&self) -> bool {
        self.pages_total > 0
    }

    /// Returns true if this record should be continued rather than restarted
    pub fn is_resumable(&self) -> bool {
        self.status == PartitionStatus::InProgress && self.has_totals()
    }

    /// Marks an item as handled and stamps the record
    pub fn record_item(&mut self, id: ItemId, done: bool, worker: &str) {
        if done {
            self.items_done += 1;
        }
        self.last_item_id = Some(id);
        self.touch(worker);
    }

    /// Number of leading `page_items` already counted before an interruption
    ///
    /// Everything up to and including `last_item_id` was recorded by the
    /// previous worker. If that id is not on the page the listing has shifted
    /// and nothing is skipped.
    pub fn counted_prefix(&self, page_items: &[ItemId]) -> usize {
        self.last_item_id
            .and_then(|last| page_items.iter().position(|id| *id == last))
            .map_or(0, |pos| pos + 1)
    }

    /// Updates the worker identity and timestamp
    pub fn touch(&mut self, worker: &str) {
        self.worker = worker.to_string();
        self.updated_at = Utc::now();
    }

    /// Share of the remote item count ingested so far, in percent
    pub fn completeness(&self) -> f64 {
        if self.items_total == 0 {
            return 0.0;
        }
        self.items_done as f64 * 100.0 / self.items_total as f64
    }
}
