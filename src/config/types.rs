use crate::state::Partition;
use serde::Deserialize;

/// Main configuration structure for mdb-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub captcha: CaptchaConfig,
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Layout of the remote catalog
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Scheme and host of the catalog, e.g. `https://www.kinopoisk.ru`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Listing page path; `{partition}` and `{page}` are substituted
    #[serde(rename = "listing-path", default = "default_listing_path")]
    pub listing_path: String,

    /// Detail page path; `{id}` is substituted
    #[serde(rename = "detail-path", default = "default_detail_path")]
    pub detail_path: String,

    /// Substring whose presence marks a captcha page
    #[serde(rename = "challenge-marker", default = "default_challenge_marker")]
    pub challenge_marker: String,
}

/// Network fetch behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Failed attempts allowed per fetch before giving up
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound of the random delay before each request (seconds)
    #[serde(rename = "max-pacing-delay", default = "default_max_pacing_delay")]
    pub max_pacing_delay: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Recovery delay per consumed attempt (seconds)
    #[serde(rename = "recovery-delay", default = "default_recovery_delay")]
    pub recovery_delay: u64,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_pacing_delay: default_max_pacing_delay(),
            request_timeout: default_request_timeout(),
            recovery_delay: default_recovery_delay(),
            user_agent: default_user_agent(),
        }
    }
}

/// Third-party OCR service used to answer captchas
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Base URL of the anti-captcha style API
    #[serde(rename = "service-url")]
    pub service_url: String,

    /// Account key sent with every task request
    #[serde(rename = "client-key")]
    pub client_key: String,

    #[serde(rename = "language-pool", default = "default_language_pool")]
    pub language_pool: String,

    /// Delay between task result polls (seconds)
    #[serde(rename = "poll-interval", default = "default_poll_interval")]
    pub poll_interval: u64,
}

/// Crawl scope and worker identity
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    #[serde(rename = "first-year")]
    pub first_year: i32,

    #[serde(rename = "last-year")]
    pub last_year: i32,

    /// Name recorded with progress and error entries; defaults to `worker-<pid>`
    #[serde(rename = "worker-id", default)]
    pub worker_id: Option<String>,
}

impl CrawlerConfig {
    /// Returns the configured worker identity, or one derived from the process id
    pub fn worker_identity(&self) -> String {
        self.worker_id
            .clone()
            .unwrap_or_else(|| format!("worker-{}", std::process::id()))
    }

    /// Year partitions covered by this configuration, oldest first
    pub fn partitions(&self) -> Vec<Partition> {
        (self.first_year..=self.last_year).map(Partition::year).collect()
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory of the page cache
    #[serde(rename = "cache-path")]
    pub cache_path: String,

    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_listing_path() -> String {
    "/lists/ord/name/m_act[year]/{partition}/m_act[all]/ok/page/{page}/".to_string()
}

fn default_detail_path() -> String {
    "/film/{id}/".to_string()
}

fn default_challenge_marker() -> String {
    "captchaimg".to_string()
}

fn default_max_attempts() -> u32 {
    100
}

fn default_max_pacing_delay() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    5
}

fn default_recovery_delay() -> u64 {
    100
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/34.0.1847.132 Safari/537.36"
        .to_string()
}

fn default_language_pool() -> String {
    "rn".to_string()
}

fn default_poll_interval() -> u64 {
    10
}
