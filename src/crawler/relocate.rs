//! Bulk migration of legacy cache entries
//!
//! Lookups already move legacy entries one at a time. This pass moves them
//! all up front, using the stored film years to pick each detail page's
//! partition and the configured year range for listing pages.

use crate::cache::{CacheKey, ContentCache};
use crate::crawler::site::SiteLayout;
use crate::state::{ItemId, Partition};
use crate::Result;

/// Counts of entries moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationReport {
    pub details: u64,
    pub listings: u64,
}

/// Moves the legacy detail entry of every `(id, year)` into its year
pub fn relocate_details(
    cache: &ContentCache,
    site: &SiteLayout,
    films: &[(ItemId, i32)],
) -> Result<u64> {
    let mut moved = 0;
    for (id, year) in films {
        let key = CacheKey::derive(site.detail_url(*id)?.as_str(), None);
        if cache.relocate_legacy(Some(&Partition::year(*year)), &key)? {
            moved += 1;
        }
    }
    Ok(moved)
}

/// Moves legacy listing pages of `partition`
///
/// With a known page total every page up to it is checked. Otherwise the scan
/// stops at the first page found neither in the legacy layout nor in the
/// partition.
pub fn relocate_listings(
    cache: &ContentCache,
    site: &SiteLayout,
    partition: &Partition,
    known_pages: Option<u32>,
) -> Result<u64> {
    let mut moved = 0;
    let mut page = 1;

    loop {
        if known_pages.is_some_and(|total| page > total) {
            break;
        }

        let key = CacheKey::derive(site.listing_url(partition, page)?.as_str(), None);
        if cache.relocate_legacy(Some(partition), &key)? {
            moved += 1;
        } else if known_pages.is_none() && !cache.contains(Some(partition), &key) {
            break;
        }
        page += 1;
    }

    if moved > 0 {
        tracing::info!("Moved {} listing pages into partition {}", moved, partition);
    }
    Ok(moved)
}
