//! Configuration module for Quarry
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so an empty file yields a working configuration.
//!
//! # Example
//!
//! ```no_run
//! use quarry::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("quarry.toml")).unwrap();
//! println!("Direct retries: {}", config.scraper.retries);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, Config, DetectionConfig, RateLimitOverride, RemoteConfig, ScraperConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
