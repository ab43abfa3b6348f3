//! Output module for operator reports
//!
//! This module handles printing the stored crawl progress (`--progress`).

pub mod stats;

pub use stats::{load_statistics, print_statistics, render_statistics, CrawlStatistics};
