//! mdb-harvest main entry point
//!
//! This is the command-line interface for the mdb-harvest catalog crawler.

use anyhow::{bail, Context};
use clap::Parser;
use mdb_harvest::cache::ContentCache;
use mdb_harvest::config::{load_config_with_hash, Config};
use mdb_harvest::crawler::{
    build_http_client, relocate_details, relocate_listings, CaptchaResolver, CaptchaSettings,
    Controller, CrawlOptions, FetchSettings, Fetcher, ItemOutcome, RelocationReport, SiteLayout,
    Sleeper, TokioSleeper,
};
use mdb_harvest::extract::FilmBuilder;
use mdb_harvest::output::{load_statistics, print_statistics};
use mdb_harvest::storage::{open_storage, SqliteStorage, Storage};
use mdb_harvest::{ItemId, Partition};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// mdb-harvest: a resumable film catalog crawler
///
/// Walks the catalog year by year, caches every page on disk, solves captcha
/// challenges through an OCR service and records progress so an interrupted
/// worker continues where it stopped.
#[derive(Parser, Debug)]
#[command(name = "mdb-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable film catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Crawl a single year
    #[arg(long, conflicts_with_all = ["from_year", "to_year", "film"])]
    year: Option<i32>,

    /// First year of the range to crawl (defaults to the configured range)
    #[arg(long)]
    from_year: Option<i32>,

    /// Last year of the range to crawl (defaults to the configured range)
    #[arg(long)]
    to_year: Option<i32>,

    /// Fetch and store a single film instead of walking listings
    #[arg(long, value_name = "ID")]
    film: Option<i64>,

    /// Fetch and parse without writing to the database
    #[arg(long)]
    read_only: bool,

    /// Only ingest films not already stored
    #[arg(long)]
    update: bool,

    /// Listing page to start the first year at
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    start_page: Option<u32>,

    /// Maximum pause before each request, in seconds (0 disables pacing)
    #[arg(long, value_name = "SECONDS")]
    max_sleep: Option<u64>,

    /// Ignore cached pages and download everything again
    #[arg(long)]
    force_download: bool,

    /// Show stored crawl progress and exit
    #[arg(long, conflicts_with_all = ["dry_run", "relocate_cache", "film"])]
    progress: bool,

    /// Move cache entries from the flat layout into year directories and exit
    #[arg(long, conflicts_with_all = ["dry_run", "progress", "film"])]
    relocate_cache: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["progress", "relocate_cache"])]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(max_sleep) = cli.max_sleep {
        config.fetch.max_pacing_delay = max_sleep;
    }
    let partitions = select_partitions(&cli, &config)?;

    if cli.dry_run {
        handle_dry_run(&config, &partitions);
    } else if cli.progress {
        handle_progress(&config)?;
    } else if cli.relocate_cache {
        handle_relocate(&config, &partitions)?;
    } else {
        handle_crawl(&cli, &config, &partitions).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("mdb_harvest=info,warn"),
            1 => EnvFilter::new("mdb_harvest=debug,info"),
            2 => EnvFilter::new("mdb_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Resolves the year selector flags against the configured range
fn select_partitions(cli: &Cli, config: &Config) -> anyhow::Result<Vec<Partition>> {
    if let Some(year) = cli.year {
        return Ok(vec![Partition::year(year)]);
    }
    if cli.from_year.is_none() && cli.to_year.is_none() {
        return Ok(config.crawler.partitions());
    }

    let first = cli.from_year.unwrap_or(config.crawler.first_year);
    let last = cli.to_year.unwrap_or(config.crawler.last_year);
    if first > last {
        bail!("--from-year {} is after --to-year {}", first, last);
    }

    Ok((first..=last).map(Partition::year).collect())
}

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config, partitions: &[Partition]) {
    println!("=== mdb-harvest Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Listing path: {}", config.site.listing_path);
    println!("  Detail path: {}", config.site.detail_path);
    println!("  Challenge marker: {}", config.site.challenge_marker);

    println!("\nFetch:");
    println!("  Max attempts: {}", config.fetch.max_attempts);
    println!("  Max pacing delay: {}s", config.fetch.max_pacing_delay);
    println!("  Request timeout: {}s", config.fetch.request_timeout);
    println!("  Recovery delay unit: {}s", config.fetch.recovery_delay);

    println!("\nCaptcha:");
    println!("  Service: {}", config.captcha.service_url);
    println!("  Language pool: {}", config.captcha.language_pool);
    println!("  Poll interval: {}s", config.captcha.poll_interval);

    println!("\nOutput:");
    println!("  Cache: {}", config.output.cache_path);
    println!("  Database: {}", config.output.database_path);

    println!("\nWorker: {}", config.crawler.worker_identity());
    match (partitions.first(), partitions.last()) {
        (Some(first), Some(last)) => {
            println!("Years: {} to {} ({} partitions)", first, last, partitions.len())
        }
        _ => println!("Years: none"),
    }
}

/// Handles the --progress mode: shows stored progress from the database
fn handle_progress(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --relocate-cache mode
fn handle_relocate(config: &Config, partitions: &[Partition]) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let cache = ContentCache::open(&config.output.cache_path)?;
    let site = SiteLayout::from_config(&config.site)?;

    let mut report = RelocationReport {
        details: relocate_details(&cache, &site, &storage.film_years()?)?,
        ..RelocationReport::default()
    };
    for partition in partitions {
        let known_pages = storage
            .load_progress(partition)?
            .filter(|p| p.has_totals())
            .map(|p| p.pages_total);
        report.listings += relocate_listings(&cache, &site, partition, known_pages)?;
    }

    tracing::info!(
        "Relocated {} detail pages and {} listing pages",
        report.details,
        report.listings
    );
    Ok(())
}

/// Handles the default mode: walks the selected years, or fetches one film
async fn handle_crawl(cli: &Cli, config: &Config, partitions: &[Partition]) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let mut controller = build_controller(cli, config, storage)?;

    if let Some(id) = cli.film {
        let id = ItemId(id);
        match controller.process_single(id, None).await? {
            ItemOutcome::Ingested | ItemOutcome::Skipped => {
                tracing::info!("Film {} processed", id)
            }
            ItemOutcome::ParseFailed(message) => bail!("film {}: {}", id, message),
            ItemOutcome::FetchExhausted => bail!("film {} could not be fetched", id),
        }
        return Ok(());
    }

    let reports = controller.run(partitions).await?;
    let ingested: u64 = reports.iter().map(|r| r.ingested).sum();
    tracing::info!(
        "Crawl finished: {} partitions, {} films ingested",
        reports.len(),
        ingested
    );
    Ok(())
}

fn build_controller(
    cli: &Cli,
    config: &Config,
    storage: SqliteStorage,
) -> anyhow::Result<Controller<SqliteStorage, FilmBuilder>> {
    let cache = ContentCache::open(&config.output.cache_path)?;

    let mut settings = FetchSettings::from_config(&config.fetch, &config.site);
    settings.force_download = cli.force_download;
    let client = build_http_client(&settings).context("failed to build HTTP client")?;

    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let resolver = CaptchaResolver::new(
        client.clone(),
        CaptchaSettings::from_config(&config.captcha)?,
        cache.clone(),
        Arc::clone(&sleeper),
    );
    let fetcher = Fetcher::new(client, cache, settings, Box::new(resolver), sleeper);

    let options = CrawlOptions {
        read_only: cli.read_only,
        update_only: cli.update,
        start_page: cli.start_page,
        worker: config.crawler.worker_identity(),
    };

    Ok(Controller::new(
        fetcher,
        SiteLayout::from_config(&config.site)?,
        storage,
        FilmBuilder,
        options,
    ))
}
