//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Partition`: the namespace a crawl works in (a release year)
//! - `ItemId`: the stable identifier of a catalog item
//! - `CrawlProgress`: per-partition cursor and completeness counters
//! - `PartitionStatus`: whether a partition walk finished

mod partition;
mod progress;

pub use partition::{ItemId, Partition};
pub use progress::{CrawlProgress, PartitionStatus};
