//! Captcha challenge resolution
//!
//! A challenge page carries an image, a `key` and a `retpath` hidden field,
//! and a form that checks the answer. Resolving it goes through fixed stages:
//!
//! 1. download the image into the cache (`captcha/` namespace)
//! 2. submit it as an `ImageToTextTask` to the OCR service
//! 3. poll the task until it is ready
//! 4. send the recognised text back through the challenge form
//!
//! Any failure along the way is reported as
//! [`HarvestError::ChallengeUnresolved`] with the stage it happened at, and the
//! fetcher charges it to the attempt budget. A challenge page missing one of
//! its required fields is a [`HarvestError::ChallengeMalformed`] instead,
//! which aborts.

use crate::cache::{CacheError, CacheKey, ContentCache};
use crate::config::CaptchaConfig;
use crate::crawler::pacing::Sleeper;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Cache namespace for challenge images
pub const CAPTCHA_NAMESPACE: &str = "captcha";

const DEFAULT_CHECK_PATH: &str = "/checkcaptcha";

/// Where in the resolution a challenge currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeStage {
    ChallengeDetected,
    ImageFetched,
    TaskSubmitted,
    Polling,
    SolutionSubmitted,
}

impl fmt::Display for ChallengeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ChallengeDetected => "challenge detected",
            Self::ImageFetched => "image fetched",
            Self::TaskSubmitted => "task submitted",
            Self::Polling => "polling",
            Self::SolutionSubmitted => "solution submitted",
        };
        f.write_str(name)
    }
}

/// Fields scraped from a challenge page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub image_url: Url,
    pub key: String,
    pub retpath: String,
    pub check_url: Url,
}

/// Returns true if `body` is a challenge page
pub fn is_challenge(body: &str, marker: &str) -> bool {
    body.contains(marker)
}

/// Scrapes the challenge fields out of `body`
///
/// The image is the first `img` inside the form, falling back to any image
/// whose source mentions "captcha". The check URL is the form action, or
/// `/checkcaptcha` on the page's host when the form has none.
pub fn parse_challenge(body: &str, page_url: &Url) -> Result<Challenge> {
    let document = Html::parse_document(body);
    let malformed = |missing: &'static str| HarvestError::ChallengeMalformed {
        url: page_url.to_string(),
        missing,
    };

    let image_src = first_attr(&document, "form img[src]", "src")
        .or_else(|| first_attr(&document, "img[src*=\"captcha\"]", "src"))
        .ok_or_else(|| malformed("image"))?;
    let image_url = page_url
        .join(&image_src)
        .map_err(|_| malformed("image"))?;

    let key = first_attr(&document, "input[name=\"key\"]", "value").ok_or_else(|| malformed("key"))?;
    let retpath = first_attr(&document, "input[name=\"retpath\"]", "value")
        .ok_or_else(|| malformed("retpath"))?;

    let action = first_attr(&document, "form[action]", "action")
        .filter(|action| !action.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CHECK_PATH.to_string());
    let check_url = page_url
        .join(&action)
        .map_err(|_| malformed("form action"))?;

    Ok(Challenge {
        image_url,
        key,
        retpath,
        check_url,
    })
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .find_map(|element| element.value().attr(attr))
        .map(|value| value.to_string())
}

/// Anything that can clear a challenge page
///
/// The fetcher only sees this trait; tests substitute counting fakes.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Attempts to clear the challenge found at `page_url`
    async fn solve(&self, page_url: &Url, body: &str) -> Result<()>;
}

/// OCR service settings
#[derive(Debug, Clone)]
pub struct CaptchaSettings {
    pub service_url: Url,
    pub client_key: String,
    pub language_pool: String,
    pub poll_interval: Duration,
}

impl CaptchaSettings {
    pub fn from_config(config: &CaptchaConfig) -> Result<Self> {
        Ok(Self {
            service_url: Url::parse(&config.service_url)?,
            client_key: config.client_key.clone(),
            language_pool: config.language_pool.clone(),
            poll_interval: Duration::from_secs(config.poll_interval),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.service_url.as_str().trim_end_matches('/'), method)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    client_key: &'a str,
    language_pool: &'a str,
    task: ImageToTextTask,
}

#[derive(Debug, Serialize)]
struct ImageToTextTask {
    #[serde(rename = "type")]
    kind: &'static str,
    body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskResponse {
    #[serde(default)]
    error_id: i64,
    error_code: Option<String>,
    error_description: Option<String>,
    task_id: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultRequest<'a> {
    client_key: &'a str,
    task_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultResponse {
    #[serde(default)]
    error_id: i64,
    error_code: Option<String>,
    error_description: Option<String>,
    status: Option<String>,
    solution: Option<TaskSolution>,
}

#[derive(Debug, Deserialize)]
struct TaskSolution {
    text: Option<String>,
}

fn service_error(code: Option<String>, description: Option<String>, error_id: i64) -> String {
    match (code, description) {
        (_, Some(description)) => description,
        (Some(code), None) => code,
        (None, None) => format!("errorId {}", error_id),
    }
}

fn unresolved(stage: ChallengeStage, reason: impl Into<String>) -> HarvestError {
    HarvestError::ChallengeUnresolved {
        stage,
        reason: reason.into(),
    }
}

/// Solves image captchas through an anti-captcha style OCR service
pub struct CaptchaResolver {
    client: Client,
    settings: CaptchaSettings,
    cache: ContentCache,
    sleeper: Arc<dyn Sleeper>,
}

impl CaptchaResolver {
    pub fn new(
        client: Client,
        settings: CaptchaSettings,
        cache: ContentCache,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            client,
            settings,
            cache,
            sleeper,
        }
    }

    async fn fetch_image(&self, challenge: &Challenge) -> Result<PathBuf> {
        let stage = ChallengeStage::ImageFetched;
        let response = self
            .client
            .get(challenge.image_url.clone())
            .send()
            .await
            .map_err(|e| unresolved(stage, e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(unresolved(
                stage,
                format!("image request answered HTTP {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| unresolved(stage, e.to_string()))?;
        if bytes.is_empty() {
            return Err(unresolved(stage, "empty image"));
        }

        let key = CacheKey::derive(challenge.image_url.as_str(), None);
        let path = self.cache.store_artifact(CAPTCHA_NAMESPACE, &key, &bytes)?;
        tracing::info!("Captcha image saved as {}", path.display());
        Ok(path)
    }

    async fn create_task(&self, image: &Path) -> Result<u64> {
        let stage = ChallengeStage::TaskSubmitted;
        let bytes = std::fs::read(image).map_err(|source| CacheError::Read {
            path: image.to_path_buf(),
            source,
        })?;

        let request = CreateTaskRequest {
            client_key: &self.settings.client_key,
            language_pool: &self.settings.language_pool,
            task: ImageToTextTask {
                kind: "ImageToTextTask",
                body: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        };

        let response = self
            .client
            .post(self.settings.endpoint("createTask"))
            .json(&request)
            .send()
            .await
            .map_err(|e| unresolved(stage, e.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(unresolved(
                stage,
                format!("createTask answered HTTP {}", response.status()),
            ));
        }

        let reply: CreateTaskResponse = response
            .json()
            .await
            .map_err(|e| unresolved(stage, format!("unreadable createTask reply: {}", e)))?;
        if reply.error_id != 0 {
            return Err(unresolved(
                stage,
                service_error(reply.error_code, reply.error_description, reply.error_id),
            ));
        }

        let task_id = reply
            .task_id
            .ok_or_else(|| unresolved(stage, "createTask reply has no taskId"))?;
        tracing::info!("Captcha task {} created", task_id);
        Ok(task_id)
    }

    async fn poll_task(&self, task_id: u64) -> Result<String> {
        let stage = ChallengeStage::Polling;
        let request = TaskResultRequest {
            client_key: &self.settings.client_key,
            task_id,
        };

        loop {
            let response = self
                .client
                .post(self.settings.endpoint("getTaskResult"))
                .json(&request)
                .send()
                .await
                .map_err(|e| unresolved(stage, e.to_string()))?;
            if response.status() != StatusCode::OK {
                return Err(unresolved(
                    stage,
                    format!("getTaskResult answered HTTP {}", response.status()),
                ));
            }

            let reply: TaskResultResponse = response
                .json()
                .await
                .map_err(|e| unresolved(stage, format!("unreadable getTaskResult reply: {}", e)))?;
            if reply.error_id != 0 {
                return Err(unresolved(
                    stage,
                    service_error(reply.error_code, reply.error_description, reply.error_id),
                ));
            }

            match reply.status.as_deref() {
                Some("processing") => {
                    tracing::debug!("Captcha task {} still processing", task_id);
                    self.sleeper.sleep(self.settings.poll_interval).await;
                }
                Some("ready") => {
                    return reply
                        .solution
                        .and_then(|solution| solution.text)
                        .map(|text| text.trim().to_string())
                        .filter(|text| !text.is_empty())
                        .ok_or_else(|| unresolved(stage, "ready task has no solution text"));
                }
                other => {
                    return Err(unresolved(
                        stage,
                        format!("unexpected task status {:?}", other),
                    ))
                }
            }
        }
    }

    async fn submit_solution(&self, challenge: &Challenge, text: &str) -> Result<()> {
        let stage = ChallengeStage::SolutionSubmitted;
        let response = self
            .client
            .get(challenge.check_url.clone())
            .query(&[
                ("key", challenge.key.as_str()),
                ("retpath", challenge.retpath.as_str()),
                ("rep", text),
            ])
            .send()
            .await
            .map_err(|e| unresolved(stage, e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(unresolved(
                stage,
                format!("answer rejected with HTTP {}", response.status()),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl ChallengeSolver for CaptchaResolver {
    async fn solve(&self, page_url: &Url, body: &str) -> Result<()> {
        let challenge = parse_challenge(body, page_url)?;
        tracing::info!(
            "Captcha {}: image {}",
            ChallengeStage::ChallengeDetected,
            challenge.image_url
        );

        let image = self.fetch_image(&challenge).await?;
        let task_id = self.create_task(&image).await?;
        let text = self.poll_task(task_id).await?;
        tracing::info!("Captcha recognised as '{}'", text);

        self.submit_solution(&challenge, &text).await?;
        tracing::info!("Captcha {}", ChallengeStage::SolutionSubmitted);
        Ok(())
    }
}
