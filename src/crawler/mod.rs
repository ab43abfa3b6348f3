//! Crawler module for catalog fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Cache-first HTTP fetching with a shared attempt budget
//! - Captcha detection and resolution
//! - Listing page parsing
//! - Partition walk orchestration and resumption

mod budget;
mod captcha;
mod controller;
mod fetcher;
mod listing;
mod pacing;
mod relocate;
mod site;

pub use budget::Budget;
pub use captcha::{
    is_challenge, parse_challenge, CaptchaResolver, CaptchaSettings, Challenge, ChallengeSolver,
    ChallengeStage, CAPTCHA_NAMESPACE,
};
pub use controller::{Controller, CrawlOptions, ItemOutcome, PartitionReport};
pub use fetcher::{build_http_client, FetchSettings, Fetcher, HttpMethod, PageRequest};
pub use listing::{parse_listing, trailing_id, ListingItem, ListingPage};
pub use pacing::{pacing_delay, Sleeper, TokioSleeper};
pub use relocate::{relocate_details, relocate_listings, RelocationReport};
pub use site::SiteLayout;
