//! Quarry: a stealth fetch-and-cache engine for product pages
//!
//! This crate fetches HTML for arbitrary URLs while working around anti-bot
//! defenses, falls back to a paid remote scraping API when the direct path is
//! blocked, and keeps a three-layer cache so repeated runs never fetch the same
//! URL twice.

pub mod cache;
pub mod config;
pub mod ratelimit;
pub mod scraper;

use thiserror::Error;

/// Main error type for Quarry operations
///
/// Per-URL scrape failures are never reported through this type; they are
/// returned as [`scraper::ScrapeOutcome`] values. This covers construction and
/// infrastructure failures only.
#[derive(Debug, Error)]
pub enum QuarryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
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

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheStore, OriginFlag};
pub use config::Config;
pub use ratelimit::{RateLimit, RateLimiter};
pub use scraper::{
    ConcurrencyGovernor, FailureKind, Method, PageIssue, ScrapeEngine, ScrapeOptions,
    ScrapeOutcome, Strategy,
};
