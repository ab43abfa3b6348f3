//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! per-partition progress from the storage layer.

use crate::state::{CrawlProgress, PartitionStatus};
use crate::storage::{ErrorEntry, SqliteStorage, Storage};
use crate::Result;
use std::fmt::Write;

/// Number of failure log entries shown in the report
const RECENT_ERRORS: usize = 10;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Progress of every partition ever crawled
    pub partitions: Vec<CrawlProgress>,

    /// Number of films stored
    pub films: u64,

    /// Number of failure log entries
    pub errors: u64,

    /// Latest failure log entries, newest first
    pub recent_errors: Vec<ErrorEntry>,
}

impl CrawlStatistics {
    /// Partitions whose walk finished
    pub fn completed(&self) -> usize {
        self.partitions
            .iter()
            .filter(|p| p.status == PartitionStatus::Complete)
            .count()
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &SqliteStorage) -> Result<CrawlStatistics> {
    Ok(CrawlStatistics {
        partitions: storage.list_progress()?,
        films: storage.count_films()?,
        errors: storage.count_errors()?,
        recent_errors: storage.recent_errors(RECENT_ERRORS)?,
    })
}

/// Formats statistics as a plain-text report
pub fn render_statistics(stats: &CrawlStatistics) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Crawl Progress ===\n");
    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Films stored: {}", stats.films);
    let _ = writeln!(
        out,
        "  Partitions: {} ({} complete)",
        stats.partitions.len(),
        stats.completed()
    );
    let _ = writeln!(out, "  Failed items logged: {}", stats.errors);
    let _ = writeln!(out);

    if !stats.partitions.is_empty() {
        let _ = writeln!(out, "Partitions:");
        for p in &stats.partitions {
            let _ = writeln!(
                out,
                "  {}: {} page {}/{}, {}/{} items ({:.1}%), last item {}, {} at {}",
                p.partition,
                p.status.to_db_string(),
                p.page,
                p.pages_total,
                p.items_done,
                p.items_total,
                p.completeness(),
                p.last_item_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                p.worker,
                p.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        let _ = writeln!(out);
    }

    if !stats.recent_errors.is_empty() {
        let _ = writeln!(out, "Recent Failures:");
        for entry in &stats.recent_errors {
            let _ = writeln!(
                out,
                "  [{}] {} item {}: {}",
                entry.logged_at.format("%Y-%m-%d %H:%M:%S"),
                entry
                    .partition
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                entry.item_id,
                entry.message
            );
        }
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &CrawlStatistics) {
    print!("{}", render_statistics(stats));
}
