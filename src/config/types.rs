use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Quarry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scraper: ScraperConfig,
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    #[serde(rename = "rate-limits")]
    pub rate_limits: Vec<RateLimitOverride>,
    pub detection: DetectionConfig,
}

/// Direct-fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Maximum direct attempts per URL
    pub retries: u32,

    /// Lower bound of the randomized delay before a retry (milliseconds)
    #[serde(rename = "delay-min-ms")]
    pub delay_min_ms: u64,

    /// Upper bound of the randomized delay before a retry (milliseconds)
    #[serde(rename = "delay-max-ms")]
    pub delay_max_ms: u64,

    /// Chance of re-sampling the stealth profile before each attempt
    #[serde(rename = "rotation-probability")]
    pub rotation_probability: f64,

    /// Per-request timeout for direct fetches
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Bodies shorter than this (after trimming) are flagged as empty
    #[serde(rename = "min-content-length")]
    pub min_content_length: usize,
}

impl ScraperConfig {
    pub fn delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.delay_min_ms),
            Duration::from_millis(self.delay_max_ms),
        )
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay_min_ms: 1000,
            delay_max_ms: 3000,
            rotation_probability: 0.3,
            request_timeout_secs: 10,
            min_content_length: 100,
        }
    }
}

/// Remote scraping API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Name of the environment variable holding the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Base URL of the scraping service
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Simultaneous in-flight remote calls, across all callers
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Rate limiter key guarding the remote API budget
    #[serde(rename = "rate-limit-key")]
    pub rate_limit_key: String,

    /// Timeout handed to the provider (milliseconds)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Maximum age of a provider-side cached page (milliseconds)
    #[serde(rename = "max-age-ms")]
    pub max_age_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key_env: "FIRECRAWL_API_KEY".to_string(),
            base_url: "https://api.firecrawl.dev".to_string(),
            max_concurrent: 2,
            rate_limit_key: "firecrawl".to_string(),
            timeout_ms: 60_000,
            max_age_ms: 14_400_000,
        }
    }
}

/// Cache location and maintenance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the index database and content files
    pub directory: PathBuf,

    /// Prior results table to seed the cache from
    #[serde(rename = "import-source")]
    pub import_source: Option<PathBuf>,

    /// Entries older than this are removed by a sweep
    #[serde(rename = "retention-days")]
    pub retention_days: Option<u32>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/cache"),
            import_source: None,
            retention_days: None,
        }
    }
}

/// Custom quota for a rate limiter key
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitOverride {
    pub key: String,

    #[serde(rename = "requests-per-minute")]
    pub requests_per_minute: u32,

    #[serde(rename = "cost-per-minute")]
    pub cost_per_minute: u64,
}

/// Indicator lists used to classify fetched pages
///
/// All matching is case-insensitive substring matching, so every entry
/// should be lowercase.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    #[serde(rename = "bot-indicators")]
    pub bot_indicators: Vec<String>,

    /// CAPTCHA vendor name -> indicators for that vendor
    #[serde(rename = "captcha-indicators")]
    pub captcha_indicators: BTreeMap<String, Vec<String>>,

    #[serde(rename = "error-indicators")]
    pub error_indicators: Vec<String>,

    #[serde(rename = "timeout-indicators")]
    pub timeout_indicators: Vec<String>,

    #[serde(rename = "js-required-indicators")]
    pub js_required_indicators: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let mut captcha = BTreeMap::new();
        captcha.insert(
            "recaptcha".to_string(),
            strings(&[
                "g-recaptcha",
                "grecaptcha",
                "google.com/recaptcha",
                "recaptcha-checkbox",
                "recaptcha-anchor",
                "i'm not a robot",
            ]),
        );
        captcha.insert(
            "hcaptcha".to_string(),
            strings(&["h-captcha", "hcaptcha.com", "hcaptcha-checkbox"]),
        );
        captcha.insert(
            "cloudflare".to_string(),
            strings(&[
                "cf-challenge",
                "cf-browser-verification",
                "checking your browser",
                "please wait while we check your browser",
                "ddos protection by cloudflare",
            ]),
        );
        captcha.insert(
            "incapsula".to_string(),
            strings(&["_incapsula_resource", "incapsula incident id"]),
        );
        captcha.insert(
            "funcaptcha".to_string(),
            strings(&["funcaptcha", "arkoselabs", "fun-captcha"]),
        );
        captcha.insert(
            "other".to_string(),
            strings(&[
                "verify you are human",
                "prove you are not a robot",
                "complete the security check",
                "anti-bot verification",
            ]),
        );

        Self {
            bot_indicators: strings(&[
                "pardon our interruption",
                "you were browsing something about your browser made us think you were a bot",
                "attention required! | cloudflare",
                "_incapsula_resource",
                "request unsuccessful. incapsula incident id",
                "verify you are human",
            ]),
            captcha_indicators: captcha,
            error_indicators: strings(&[
                "404 not found",
                "403 forbidden",
                "500 internal server error",
                "page not found",
                "access forbidden",
            ]),
            timeout_indicators: strings(&[
                "took too long to respond",
                "connection timed out",
                "request timeout",
            ]),
            js_required_indicators: strings(&[
                "please enable javascript",
                "javascript is required",
                "you need to enable javascript",
                "enable javascript and cookies",
            ]),
        }
    }
}
