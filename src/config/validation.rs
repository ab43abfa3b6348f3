use crate::config::types::{
    CaptchaConfig, Config, CrawlerConfig, FetchConfig, OutputConfig, SiteConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_fetch_config(&config.fetch)?;
    validate_captcha_config(&config.captcha)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the catalog layout
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;

    for placeholder in ["{partition}", "{page}"] {
        if !config.listing_path.contains(placeholder) {
            return Err(ConfigError::Validation(format!(
                "listing-path must contain {}, got '{}'",
                placeholder, config.listing_path
            )));
        }
    }

    if !config.detail_path.contains("{id}") {
        return Err(ConfigError::Validation(format!(
            "detail-path must contain {{id}}, got '{}'",
            config.detail_path
        )));
    }

    if config.challenge_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "challenge-marker cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetch limits
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout must be >= 1s, got {}s",
            config.request_timeout
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the OCR service settings
fn validate_captcha_config(config: &CaptchaConfig) -> Result<(), ConfigError> {
    validate_http_url("service-url", &config.service_url)?;

    if config.poll_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "poll-interval must be >= 1s, got {}s",
            config.poll_interval
        )));
    }

    Ok(())
}

/// Validates the crawl scope
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.first_year > config.last_year {
        return Err(ConfigError::Validation(format!(
            "first-year ({}) must not be after last-year ({})",
            config.first_year, config.last_year
        )));
    }

    if let Some(worker) = &config.worker_id {
        if worker.trim().is_empty() {
            return Err(ConfigError::Validation(
                "worker-id cannot be empty when given".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.cache_path.is_empty() {
        return Err(ConfigError::Validation(
            "cache-path cannot be empty".to_string(),
        ));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}
