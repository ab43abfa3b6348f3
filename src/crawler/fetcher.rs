//! Cache-first HTTP fetcher
//!
//! This module handles every request the crawler makes to the catalog:
//! - Serving bodies from the content cache when possible
//! - Pacing requests with a random pause
//! - Retrying connection failures with a growing recovery delay
//! - Handing challenge pages to a [`ChallengeSolver`] and retrying the request
//!
//! Network failures and unsolved challenges draw from one [`Budget`] per
//! fetch. When it runs out the fetch yields `Ok(None)`; errors are reserved
//! for problems retrying cannot fix.

use crate::cache::{CacheKey, ContentCache};
use crate::config::{FetchConfig, SiteConfig};
use crate::crawler::budget::Budget;
use crate::crawler::captcha::{is_challenge, ChallengeSolver};
use crate::crawler::pacing::{pacing_delay, Sleeper};
use crate::state::Partition;
use crate::{HarvestError, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Request method of a [`PageRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One logical fetch
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: Url,
    pub method: HttpMethod,

    /// Form fields sent with a POST
    pub payload: Vec<(String, String)>,

    /// Distinguishes requests sharing a URL (e.g. POSTed pagination) in the cache
    pub salt: Option<String>,

    /// Skip the cache lookup; the fresh body still replaces the cached one
    pub force_download: bool,
}

impl PageRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            payload: Vec::new(),
            salt: None,
            force_download: false,
        }
    }

    pub fn post(url: Url, payload: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            payload,
            ..Self::get(url)
        }
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn force_download(mut self, force: bool) -> Self {
        self.force_download = force;
        self
    }

    /// Key this request is cached under
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::derive(self.url.as_str(), self.salt.as_deref())
    }

    fn identity(&self) -> String {
        match &self.salt {
            Some(salt) => format!("{}:{}", self.url, salt),
            None => self.url.to_string(),
        }
    }
}

/// Fetch loop tuning
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub max_attempts: u32,
    pub max_pacing_delay: Duration,
    pub request_timeout: Duration,
    pub recovery_delay: Duration,
    pub challenge_marker: String,
    pub user_agent: String,
    /// Bypass the cache on every request
    pub force_download: bool,
}

impl FetchSettings {
    pub fn from_config(fetch: &FetchConfig, site: &SiteConfig) -> Self {
        Self {
            max_attempts: fetch.max_attempts,
            max_pacing_delay: Duration::from_secs(fetch.max_pacing_delay),
            request_timeout: Duration::from_secs(fetch.request_timeout),
            recovery_delay: Duration::from_secs(fetch.recovery_delay),
            challenge_marker: site.challenge_marker.clone(),
            user_agent: fetch.user_agent.clone(),
            force_download: false,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        let site_marker = "captchaimg".to_string();
        let fetch = FetchConfig::default();
        Self {
            max_attempts: fetch.max_attempts,
            max_pacing_delay: Duration::from_secs(fetch.max_pacing_delay),
            request_timeout: Duration::from_secs(fetch.request_timeout),
            recovery_delay: Duration::from_secs(fetch.recovery_delay),
            challenge_marker: site_marker,
            user_agent: fetch.user_agent,
            force_download: false,
        }
    }
}

/// Builds the HTTP client used for catalog and OCR requests
///
/// Both the connect and the total request time are bounded by the configured
/// timeout, and connections are not kept alive between requests.
pub fn build_http_client(settings: &FetchSettings) -> std::result::Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));

    Client::builder()
        .user_agent(settings.user_agent.as_str())
        .default_headers(headers)
        .timeout(settings.request_timeout)
        .connect_timeout(settings.request_timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Cache-first, budgeted fetcher
pub struct Fetcher {
    client: Client,
    cache: ContentCache,
    settings: FetchSettings,
    solver: Box<dyn ChallengeSolver>,
    sleeper: Arc<dyn Sleeper>,
}

impl Fetcher {
    pub fn new(
        client: Client,
        cache: ContentCache,
        settings: FetchSettings,
        solver: Box<dyn ChallengeSolver>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            client,
            cache,
            settings,
            solver,
            sleeper,
        }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches `url` with a plain GET
    pub async fn get(&self, url: &Url, partition: Option<&Partition>) -> Result<Option<String>> {
        let request = PageRequest::get(url.clone()).force_download(self.settings.force_download);
        self.fetch(&request, partition).await
    }

    /// Fetches a page, from the cache if possible
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Cache hit | Return cached body, no network |
    /// | Challenge page | Solve (charged to the budget), then repeat the request |
    /// | HTTP 200 | Store in cache, return body |
    /// | Other HTTP status | Give up, `Ok(None)` |
    /// | Timeout / connection error | Charge budget, wait `recovery × consumed`, retry |
    /// | Budget exhausted | `Ok(None)` |
    ///
    /// # Errors
    ///
    /// Cache disk failures and malformed challenge pages.
    pub async fn fetch(
        &self,
        request: &PageRequest,
        partition: Option<&Partition>,
    ) -> Result<Option<String>> {
        let key = request.cache_key();

        if !request.force_download {
            if let Some(body) = self.cache.lookup(partition, &key)? {
                tracing::info!("Reading {} from cache", request.identity());
                return Ok(Some(body));
            }
        }

        tracing::info!("Downloading {}", request.identity());
        let mut budget = Budget::new(self.settings.max_attempts);

        while !budget.is_exhausted() {
            self.pace(&budget).await;

            let error = match self.send(request).await {
                Ok((_, body)) if is_challenge(&body, &self.settings.challenge_marker) => {
                    tracing::warn!("Captcha challenge at {}", request.url);
                    self.resolve_challenge(&request.url, &body, &mut budget)
                        .await?;
                    continue;
                }
                Ok((status, body)) if status == StatusCode::OK => {
                    self.cache.store(partition, &key, &body)?;
                    return Ok(Some(body));
                }
                Ok((status, _)) => {
                    tracing::warn!("{} answered HTTP {}, giving up", request.url, status);
                    return Ok(None);
                }
                Err(error) => error,
            };

            budget.consume();
            tracing::warn!(
                "{}; {} of {} attempts left",
                error,
                budget.remaining(),
                budget.limit()
            );
            self.recover(&budget).await;
        }

        tracing::error!(
            "Giving up on {} after {} failed attempts",
            request.identity(),
            budget.consumed()
        );
        Ok(None)
    }

    /// Sends the request once; transport and body-read failures are transient
    async fn send(&self, request: &PageRequest) -> Result<(StatusCode, String)> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self.client.post(request.url.clone()).form(&request.payload),
        };

        let transient = |source| HarvestError::TransientNetwork {
            url: request.url.to_string(),
            source,
        };

        let response = builder.send().await.map_err(transient)?;
        let status = response.status();
        let body = response.text().await.map_err(transient)?;
        Ok((status, body))
    }

    /// Keeps asking the solver to clear the challenge until it succeeds or
    /// the budget runs out
    ///
    /// A solve is charged to the budget too; a site that keeps challenging
    /// after accepted answers must not be retried forever.
    async fn resolve_challenge(&self, url: &Url, body: &str, budget: &mut Budget) -> Result<()> {
        while !budget.is_exhausted() {
            match self.solver.solve(url, body).await {
                Ok(()) => {
                    budget.consume();
                    tracing::info!(
                        "Captcha at {} solved, {} attempts left",
                        url,
                        budget.remaining()
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    budget.consume();
                    tracing::warn!("{}; {} attempts left", e, budget.remaining());
                    self.recover(budget).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn pace(&self, budget: &Budget) {
        let delay = pacing_delay(self.settings.max_pacing_delay);
        if delay.is_zero() {
            return;
        }
        tracing::info!(
            "Sleeping {:.1}s, tries left: {}",
            delay.as_secs_f64(),
            budget.remaining()
        );
        self.sleeper.sleep(delay).await;
    }

    async fn recover(&self, budget: &Budget) {
        if budget.is_exhausted() {
            return;
        }
        let delay = budget.recovery_delay(self.settings.recovery_delay);
        if delay.is_zero() {
            return;
        }
        tracing::info!("Waiting {}s before retrying", delay.as_secs());
        self.sleeper.sleep(delay).await;
    }
}
