//! mdb-harvest: a resumable catalog crawler
//!
//! This crate walks a paginated, year-partitioned film catalog, fetches each
//! detail page through a content-addressed disk cache, survives network
//! failures and captcha challenges, and records per-partition progress so a
//! killed worker can pick up where it stopped.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

pub use cache::{CacheError, CacheKey, ContentCache};
pub use crawler::ChallengeStage;
pub use extract::ParseFailure;
pub use state::{CrawlProgress, ItemId, Partition, PartitionStatus};
pub use storage::StorageError;

/// Main error type for mdb-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    CacheIo(#[from] CacheError),

    #[error("Network error for {url}: {source}")]
    TransientNetwork { url: String, source: reqwest::Error },

    #[error("Captcha unresolved at {stage}: {reason}")]
    ChallengeUnresolved {
        stage: ChallengeStage,
        reason: String,
    },

    #[error("Malformed captcha page at {url}: missing {missing}")]
    ChallengeMalformed { url: String, missing: &'static str },

    #[error("Partition {partition}, page {page}: {what} not found on listing page")]
    RemoteDataMissing {
        partition: Partition,
        page: u32,
        what: &'static str,
    },

    #[error("Partition {partition}, page {page}: listing page could not be fetched")]
    ListingUnavailable { partition: Partition, page: u32 },

    #[error("Partition {partition}: every item fetch was exhausted ({attempted} attempted)")]
    Outage {
        partition: Partition,
        attempted: u64,
    },

    #[error("Parse failure: {0}")]
    Parse(#[from] ParseFailure),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),
}

/// Coarse classification of a [`HarvestError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Local disk failure in the content cache
    CacheIo,
    /// Connection reset, timeout and the like
    TransientNetwork,
    /// Captcha could not be solved this time
    ChallengeUnresolved,
    /// Listing markup lacks data needed to verify completeness
    RemoteDataMissing,
    /// A detail page could not be mapped to a record
    ParseFailure,
    /// Anything that makes further work pointless (config, storage, bad challenge markup)
    Fatal,
}

/// What the caller should do with an error of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Try again while the attempt budget lasts
    Retry,
    /// Record against the current item and move on
    Isolate,
    /// Stop the worker
    Abort,
}

impl ErrorKind {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::TransientNetwork | Self::ChallengeUnresolved => Disposition::Retry,
            Self::ParseFailure => Disposition::Isolate,
            Self::CacheIo | Self::RemoteDataMissing | Self::Fatal => Disposition::Abort,
        }
    }
}

impl HarvestError {
    /// Classifies this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CacheIo(_) => ErrorKind::CacheIo,
            Self::TransientNetwork { .. } => ErrorKind::TransientNetwork,
            Self::ChallengeUnresolved { .. } => ErrorKind::ChallengeUnresolved,
            Self::RemoteDataMissing { .. }
            | Self::ListingUnavailable { .. }
            | Self::Outage { .. } => ErrorKind::RemoteDataMissing,
            Self::Parse(_) => ErrorKind::ParseFailure,
            Self::Config(_)
            | Self::ChallengeMalformed { .. }
            | Self::Storage(_)
            | Self::HttpClient(_)
            | Self::UrlParse(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if the fetch loop may retry after this error
    pub fn is_retryable(&self) -> bool {
        self.kind().disposition() == Disposition::Retry
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for mdb-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub use config::Config;
pub use crawler::{Controller, Fetcher};
