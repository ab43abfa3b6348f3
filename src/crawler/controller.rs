//! Crawl controller - partition walk orchestration
//!
//! This module contains the loop that walks a partition's listing pages,
//! ingests every item found on them, and keeps the stored progress current so
//! a killed worker resumes where it stopped:
//! - Resuming from saved progress (or an operator start page)
//! - Verifying remote totals on the first page
//! - Fetching, building and storing each item
//! - Isolating per-item failures in the error log
//! - Detecting partitions where nothing could be fetched at all

use crate::crawler::fetcher::Fetcher;
use crate::crawler::listing::parse_listing;
use crate::crawler::site::SiteLayout;
use crate::extract::RecordBuilder;
use crate::state::{CrawlProgress, ItemId, Partition, PartitionStatus};
use crate::storage::{ErrorEntry, Storage};
use crate::{HarvestError, Result};

/// Operator switches for a crawl run
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Fetch and parse but persist nothing
    pub read_only: bool,

    /// Only ingest items not already stored
    pub update_only: bool,

    /// Page to start the first partition at, overriding saved progress
    pub start_page: Option<u32>,

    /// Identity recorded with progress and error entries
    pub worker: String,
}

/// What happened to one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Record built (and stored unless read-only)
    Ingested,

    /// Already stored; skipped in update mode
    Skipped,

    /// Detail page fetched but could not be mapped to a record
    ParseFailed(String),

    /// Detail page could not be fetched within the attempt budget
    FetchExhausted,
}

impl ItemOutcome {
    /// Whether the item counts towards the partition's done counter
    pub fn counts_as_done(&self) -> bool {
        matches!(self, Self::Ingested | Self::Skipped)
    }
}

/// Per-partition tallies of a finished walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub partition: Partition,
    pub pages_walked: u32,
    pub ingested: u64,
    pub skipped: u64,
    pub parse_failures: u64,
    pub exhausted: u64,
}

impl PartitionReport {
    fn new(partition: Partition) -> Self {
        Self {
            partition,
            pages_walked: 0,
            ingested: 0,
            skipped: 0,
            parse_failures: 0,
            exhausted: 0,
        }
    }

    fn tally(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Ingested => self.ingested += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::ParseFailed(_) => self.parse_failures += 1,
            ItemOutcome::FetchExhausted => self.exhausted += 1,
        }
    }

    /// Items that needed a detail fetch
    pub fn attempted(&self) -> u64 {
        self.ingested + self.parse_failures + self.exhausted
    }
}

/// Main crawl controller structure
///
/// Generic over the store and the record builder so tests can drive it with
/// in-memory fakes; the two must agree on the record type.
pub struct Controller<S, B> {
    fetcher: Fetcher,
    site: SiteLayout,
    storage: S,
    builder: B,
    options: CrawlOptions,
}

impl<S, B> Controller<S, B>
where
    B: RecordBuilder,
    S: Storage<Record = B::Record>,
{
    pub fn new(
        fetcher: Fetcher,
        site: SiteLayout,
        storage: S,
        builder: B,
        options: CrawlOptions,
    ) -> Self {
        Self {
            fetcher,
            site,
            storage,
            builder,
            options,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Walks every partition in order
    ///
    /// Stops at the first partition that fails; partitions already walked keep
    /// their completed progress.
    pub async fn run(&mut self, partitions: &[Partition]) -> Result<Vec<PartitionReport>> {
        let mut reports = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let report = self.crawl_partition(partition).await?;
            tracing::info!(
                "Partition {} done: {} ingested, {} skipped, {} parse failures, {} unreachable",
                partition,
                report.ingested,
                report.skipped,
                report.parse_failures,
                report.exhausted
            );
            reports.push(report);
        }

        Ok(reports)
    }

    /// Walks one partition from its resume point to its last listing page
    ///
    /// # Errors
    ///
    /// * `ListingUnavailable` - a listing page could not be fetched
    /// * `RemoteDataMissing` - the first page lacks the total item count
    /// * `Outage` - every item needing a fetch came back exhausted
    /// * cache and storage failures
    pub async fn crawl_partition(&mut self, partition: &Partition) -> Result<PartitionReport> {
        let worker = self.options.worker.clone();
        let (mut progress, mut resumed) = self.starting_progress(partition)?;
        let mut report = PartitionReport::new(partition.clone());
        let mut page = progress.page;

        loop {
            let url = self.site.listing_url(partition, page)?;
            tracing::info!("Processing partition {} page {}", partition, page);

            let body = self
                .fetcher
                .get(&url, Some(partition))
                .await?
                .ok_or_else(|| HarvestError::ListingUnavailable {
                    partition: partition.clone(),
                    page,
                })?;
            let listing = parse_listing(&body, &url);

            if page == 1 || !progress.has_totals() {
                progress.items_total =
                    listing
                        .total_items
                        .ok_or_else(|| HarvestError::RemoteDataMissing {
                            partition: partition.clone(),
                            page,
                            what: "total item count",
                        })?;
                progress.pages_total = listing.total_pages;
                tracing::info!(
                    "Partition {}: {} items on {} pages",
                    partition,
                    progress.items_total,
                    progress.pages_total
                );
            }

            progress.page = page;
            progress.touch(&worker);
            self.save_progress(&progress)?;
            report.pages_walked += 1;

            // A resumed page starts after the items the killed worker counted
            let mut skip = 0;
            if std::mem::take(&mut resumed) {
                let ids: Vec<ItemId> = listing.items.iter().map(|item| item.id).collect();
                skip = progress.counted_prefix(&ids);
                if skip > 0 {
                    tracing::debug!(
                        "Skipping {} items already counted on page {}",
                        skip,
                        page
                    );
                }
            }

            for item in listing.items.iter().skip(skip) {
                tracing::debug!("{} | {} | {}", item.id, item.title, item.href);

                let outcome = self.process_item(Some(partition), item.id).await?;
                report.tally(&outcome);

                progress.record_item(item.id, outcome.counts_as_done(), &worker);
                self.save_progress(&progress)?;
            }

            if page >= progress.pages_total {
                break;
            }
            page += 1;
        }

        progress.status = PartitionStatus::Complete;
        progress.touch(&worker);
        self.save_progress(&progress)?;
        tracing::info!(
            "Partition {} complete: {} of {} items ({:.1}%)",
            partition,
            progress.items_done,
            progress.items_total,
            progress.completeness()
        );

        let attempted = report.attempted();
        if attempted > 0 && report.exhausted == attempted {
            return Err(HarvestError::Outage {
                partition: partition.clone(),
                attempted,
            });
        }

        Ok(report)
    }

    /// Fetches, builds and stores a single item without walking any listing
    pub async fn process_single(
        &mut self,
        id: ItemId,
        partition: Option<&Partition>,
    ) -> Result<ItemOutcome> {
        self.process_item(partition, id).await
    }

    /// Picks the page to start at and the counters to carry
    ///
    /// The flag is set when saved progress is continued on its saved page.
    fn starting_progress(&mut self, partition: &Partition) -> Result<(CrawlProgress, bool)> {
        let worker = &self.options.worker;
        let mut resumed = false;

        let mut progress = match self.storage.load_progress(partition)? {
            Some(saved) if saved.is_resumable() => {
                tracing::info!(
                    "Resuming partition {} at page {} of {} ({} of {} items done, last written by {})",
                    partition,
                    saved.page,
                    saved.pages_total,
                    saved.items_done,
                    saved.items_total,
                    saved.worker
                );
                resumed = true;
                saved
            }
            Some(saved) if saved.status == PartitionStatus::Complete => {
                tracing::info!("Partition {} was complete, walking it again", partition);
                CrawlProgress::new(partition.clone(), worker)
            }
            _ => CrawlProgress::new(partition.clone(), worker),
        };

        // Only the first partition of a run honours the override
        if let Some(start) = self.options.start_page.take() {
            tracing::info!("Starting partition {} at page {}", partition, start);
            progress.page = start.max(1);
            resumed = false;
        }

        Ok((progress, resumed))
    }

    async fn process_item(&mut self, partition: Option<&Partition>, id: ItemId) -> Result<ItemOutcome> {
        if self.options.update_only {
            if self.storage.record_exists(id)? {
                tracing::debug!("Item {} already stored, skipping", id);
                return Ok(ItemOutcome::Skipped);
            }
            tracing::info!("Item {} is newly discovered", id);
        }

        let url = self.site.detail_url(id)?;
        let Some(body) = self.fetcher.get(&url, partition).await? else {
            self.record_failure(partition, id, "detail page could not be fetched")?;
            return Ok(ItemOutcome::FetchExhausted);
        };

        match self.builder.build_record(id, &body) {
            Ok(record) => {
                if self.options.read_only {
                    tracing::info!("Read-only mode, not storing item {}", id);
                } else {
                    self.storage.upsert(&record)?;
                }
                Ok(ItemOutcome::Ingested)
            }
            Err(failure) => {
                let item = failure.item();
                let error = HarvestError::from(failure);
                let message = error.to_string();
                self.record_failure(partition, item, &message)?;
                Ok(ItemOutcome::ParseFailed(message))
            }
        }
    }

    fn record_failure(&mut self, partition: Option<&Partition>, id: ItemId, message: &str) -> Result<()> {
        tracing::error!(
            "Partition {}, item {}: {} (worker {})",
            partition.map(Partition::as_str).unwrap_or("-"),
            id,
            message,
            self.options.worker
        );

        if self.options.read_only {
            return Ok(());
        }

        let entry = ErrorEntry::new(partition.cloned(), id, message, &self.options.worker);
        self.storage.log_error(&entry)?;
        Ok(())
    }

    fn save_progress(&mut self, progress: &CrawlProgress) -> Result<()> {
        if self.options.read_only {
            return Ok(());
        }
        self.storage.save_progress(progress)?;
        Ok(())
    }
}
