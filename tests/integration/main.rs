//! End-to-end tests against mock target sites and a mock remote API

mod cache_tests;
mod scrape_tests;

use quarry::config::Config;
use quarry::scraper::{ConcurrencyGovernor, FirecrawlClient, RemoteScraper, ScrapeEngine};
use quarry::{RateLimit, RateLimiter};
use std::sync::Arc;
use wiremock::MockServer;

/// Fast-retry configuration pointed at a mock remote API
pub fn test_config(remote: Option<&MockServer>) -> Config {
    let mut config = Config::default();
    config.scraper.retries = 2;
    config.scraper.delay_min_ms = 0;
    config.scraper.delay_max_ms = 0;
    config.scraper.request_timeout_secs = 2;
    if let Some(server) = remote {
        config.remote.base_url = server.uri();
        config.remote.timeout_ms = 2_000;
    }
    config
}

/// Engine with a Firecrawl client when a remote server is given
pub fn build_engine(remote: Option<&MockServer>) -> ScrapeEngine {
    let config = test_config(remote);
    let provider: Option<Arc<dyn RemoteScraper>> = remote.map(|_| {
        Arc::new(FirecrawlClient::new("test-key", &config.remote).unwrap()) as Arc<dyn RemoteScraper>
    });

    let limiter = Arc::new(RateLimiter::new());
    limiter.set_limits("firecrawl", RateLimit::new(100, 100));

    ScrapeEngine::new(&config, provider, limiter, ConcurrencyGovernor::new(2)).unwrap()
}

/// A page long enough to pass the empty-content check
pub fn product_page(name: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body>{}</body></html>",
        name,
        "<p>Brushed steel finish, adjustable height, five year warranty.</p>".repeat(4)
    )
}
