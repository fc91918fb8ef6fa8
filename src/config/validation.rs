use crate::config::types::{CacheConfig, Config, RateLimitOverride, RemoteConfig, ScraperConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound on simultaneous remote API calls
const MAX_REMOTE_CONCURRENCY: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scraper_config(&config.scraper)?;
    validate_remote_config(&config.remote)?;
    validate_cache_config(&config.cache)?;
    validate_rate_limits(&config.rate_limits)?;
    Ok(())
}

/// Validates direct-fetch settings
fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.retries < 1 {
        return Err(ConfigError::Validation(format!(
            "retries must be >= 1, got {}",
            config.retries
        )));
    }

    if config.delay_min_ms > config.delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "delay-min-ms ({}) must not exceed delay-max-ms ({})",
            config.delay_min_ms, config.delay_max_ms
        )));
    }

    if !(0.0..=1.0).contains(&config.rotation_probability) {
        return Err(ConfigError::Validation(format!(
            "rotation-probability must be between 0 and 1, got {}",
            config.rotation_probability
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates remote API settings
fn validate_remote_config(config: &RemoteConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > MAX_REMOTE_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "max-concurrent must be between 1 and {}, got {}",
            MAX_REMOTE_CONCURRENCY, config.max_concurrent
        )));
    }

    if config.api_key_env.is_empty() {
        return Err(ConfigError::Validation(
            "api-key-env cannot be empty".to_string(),
        ));
    }

    if config.rate_limit_key.is_empty() {
        return Err(ConfigError::Validation(
            "rate-limit-key cannot be empty".to_string(),
        ));
    }

    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    Ok(())
}

/// Validates cache settings
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "cache directory cannot be empty".to_string(),
        ));
    }

    if config.retention_days == Some(0) {
        return Err(ConfigError::Validation(
            "retention-days must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates rate limit overrides
fn validate_rate_limits(overrides: &[RateLimitOverride]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in overrides {
        if entry.key.is_empty() {
            return Err(ConfigError::Validation(
                "rate limit key cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.key.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate rate limit override for '{}'",
                entry.key
            )));
        }

        if entry.requests_per_minute < 1 || entry.cost_per_minute < 1 {
            return Err(ConfigError::Validation(format!(
                "rate limit '{}' must allow at least one request and one cost unit per minute",
                entry.key
            )));
        }
    }

    Ok(())
}
