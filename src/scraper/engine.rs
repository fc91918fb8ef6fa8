//! Method selection and the cache-aware fetch path
//!
//! `scrape` walks the strategy's plan in order. After each method the
//! outcome is checked with [`should_fall_back`]; only AUTO has a second step.
//! Remote calls pass through the [`ConcurrencyGovernor`] first and the
//! [`RateLimiter`] second.

use crate::cache::{CacheStore, PutMetadata};
use crate::config::Config;
use crate::ratelimit::RateLimiter;
use crate::scraper::direct::DirectFetcher;
use crate::scraper::governor::ConcurrencyGovernor;
use crate::scraper::outcome::{FailureKind, Method, PageIssue, ScrapeOutcome, Strategy};
use crate::scraper::remote::{FirecrawlClient, RemoteScraper};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Per-call overrides; unset fields fall back to the engine's configuration
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    pub retries: Option<u32>,
    pub delay_range: Option<(Duration, Duration)>,
    /// Cost charged against the remote API budget (default 1)
    pub estimated_cost: Option<u64>,
}

/// Whether to move on to `next` after `previous` came back
///
/// Not-found is terminal. A success without a bot interstitial is final.
/// The remote API is skipped when no provider is configured.
pub fn should_fall_back(previous: &ScrapeOutcome, next: Method, remote_available: bool) -> bool {
    if next == Method::RemoteApi && !remote_available {
        return false;
    }
    if previous.is_not_found() {
        return false;
    }
    !(previous.success && !previous.has_issue(PageIssue::BotDetected))
}

pub struct ScrapeEngine {
    direct: DirectFetcher,
    remote: Option<Arc<dyn RemoteScraper>>,
    limiter: Arc<RateLimiter>,
    governor: ConcurrencyGovernor,
    rate_limit_key: String,
    retries: u32,
    delay_range: (Duration, Duration),
}

impl ScrapeEngine {
    /// Builds an engine from explicit parts
    ///
    /// Fails only if the HTTP client cannot be constructed.
    pub fn new(
        config: &Config,
        remote: Option<Arc<dyn RemoteScraper>>,
        limiter: Arc<RateLimiter>,
        governor: ConcurrencyGovernor,
    ) -> crate::Result<Self> {
        Ok(Self {
            direct: DirectFetcher::new(&config.scraper, &config.detection)?,
            remote,
            limiter,
            governor,
            rate_limit_key: config.remote.rate_limit_key.clone(),
            retries: config.scraper.retries,
            delay_range: config.scraper.delay_range(),
        })
    }

    /// Builds an engine whose remote provider is Firecrawl, keyed from the
    /// environment variable named in the config
    ///
    /// A missing key is not an error: the engine runs direct-only and says so
    /// once.
    pub fn from_config(
        config: &Config,
        limiter: Arc<RateLimiter>,
        governor: ConcurrencyGovernor,
    ) -> crate::Result<Self> {
        let remote: Option<Arc<dyn RemoteScraper>> = match FirecrawlClient::from_env(&config.remote)? {
            Some(client) => Some(Arc::new(client)),
            None => {
                warn!(
                    "{} not set; remote API fallback disabled",
                    config.remote.api_key_env
                );
                None
            }
        };
        Self::new(config, remote, limiter, governor)
    }

    pub fn remote_available(&self) -> bool {
        self.remote.is_some()
    }

    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    /// Fetches `url` with the given strategy; never fails, never panics on
    /// per-URL problems
    ///
    /// # Arguments
    ///
    /// * `url` - Page to fetch
    /// * `strategy` - Which methods to try, and in what order
    /// * `options` - Per-call overrides for retries, delays and remote cost
    ///
    /// # Returns
    ///
    /// A [`ScrapeOutcome`] describing the last method tried, with bookkeeping
    /// from earlier methods folded in
    ///
    /// # Example
    ///
    /// ```no_run
    /// use quarry::config::load_config;
    /// use quarry::scraper::{ConcurrencyGovernor, ScrapeEngine, ScrapeOptions, Strategy};
    /// use quarry::RateLimiter;
    /// use std::path::Path;
    /// use std::sync::Arc;
    ///
    /// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = load_config(Path::new("quarry.toml"))?;
    /// let limiter = Arc::new(RateLimiter::from_overrides(&config.rate_limits));
    /// let governor = ConcurrencyGovernor::new(config.remote.max_concurrent);
    /// let engine = ScrapeEngine::from_config(&config, limiter, governor)?;
    ///
    /// let outcome = engine
    ///     .scrape("https://shop.example/item/1", Strategy::Auto, &ScrapeOptions::default())
    ///     .await;
    /// println!("{} via {}", outcome.success, outcome.final_method);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scrape(&self, url: &str, strategy: Strategy, options: &ScrapeOptions) -> ScrapeOutcome {
        let start = Instant::now();
        let mut current: Option<ScrapeOutcome> = None;

        for &method in strategy.plan() {
            if let Some(previous) = &current {
                if !should_fall_back(previous, method, self.remote_available()) {
                    break;
                }
                info!(
                    url = %url,
                    from = %previous.final_method,
                    to = %method,
                    "Falling back"
                );
            }

            let outcome = self.run(method, url, options).await;
            current = Some(match current.take() {
                Some(previous) => outcome.merged_with(previous),
                None => outcome,
            });
        }

        let mut outcome = current.unwrap_or_else(|| {
            ScrapeOutcome::failure(
                url,
                Method::Direct,
                FailureKind::Transport { timeout: false },
                "no scrape method attempted",
            )
        });
        outcome.scrape_time = start.elapsed();
        outcome
    }

    async fn run(&self, method: Method, url: &str, options: &ScrapeOptions) -> ScrapeOutcome {
        match method {
            Method::Direct => {
                self.direct
                    .scrape(
                        url,
                        options.retries.unwrap_or(self.retries),
                        options.delay_range.unwrap_or(self.delay_range),
                    )
                    .await
            }
            Method::RemoteApi => self.scrape_remote(url, options).await,
            Method::Cached => ScrapeOutcome::failure(
                url,
                Method::Cached,
                FailureKind::Transport { timeout: false },
                "cache lookups go through fetch",
            ),
        }
    }

    async fn scrape_remote(&self, url: &str, options: &ScrapeOptions) -> ScrapeOutcome {
        let start = Instant::now();

        let Some(remote) = &self.remote else {
            return ScrapeOutcome::failure(
                url,
                Method::RemoteApi,
                FailureKind::RemoteUnavailable,
                "Remote API key not provided",
            )
            .with_status(Some(500))
            .timed(start);
        };

        let _permit = match self.governor.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return ScrapeOutcome::failure(
                    url,
                    Method::RemoteApi,
                    FailureKind::RemoteApi { timeout: false },
                    format!("Remote API slot unavailable: {}", e),
                )
                .with_status(Some(500))
                .timed(start)
            }
        };

        let cost = options.estimated_cost.unwrap_or(1);
        self.limiter.acquire(&self.rate_limit_key, cost).await;
        debug!(url = %url, key = %self.rate_limit_key, "Acquired remote API admission");

        info!(url = %url, provider = remote.name(), "Calling remote API");
        match remote.scrape(url).await {
            Ok(page) => {
                info!(
                    url = %url,
                    bytes = page.html.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Remote API success"
                );
                let issues = self.direct.detector().analyze(&page.html).issues();
                let final_url = page.final_url.unwrap_or_else(|| url.to_string());
                ScrapeOutcome::success(url, Method::RemoteApi, 200, page.html, final_url)
                    .with_issues(issues)
                    .timed(start)
            }
            Err(e) => {
                error!(url = %url, provider = remote.name(), "Remote API failed: {}", e);
                let timeout = e.is_timeout();
                let outcome = ScrapeOutcome::failure(
                    url,
                    Method::RemoteApi,
                    FailureKind::RemoteApi { timeout },
                    e.to_string(),
                )
                .with_status(Some(e.status_code()));
                if timeout {
                    outcome.with_issues([PageIssue::Timeout]).timed(start)
                } else {
                    outcome.timed(start)
                }
            }
        }
    }

    /// Cache-first fetch: hit returns the cached page, miss scrapes and
    /// stores successful results
    ///
    /// Cache failures degrade to a warning on the outcome; they never stop
    /// the scrape.
    pub async fn fetch(
        &self,
        cache: &CacheStore,
        url: &str,
        strategy: Strategy,
        options: &ScrapeOptions,
    ) -> ScrapeOutcome {
        let start = Instant::now();
        let mut warnings = Vec::new();

        match cache.get(url).await {
            Ok(Some(content)) => {
                debug!(url = %url, "Serving from cache");
                let status = match cache.entry(url) {
                    Ok(entry) => entry.and_then(|e| e.status_code).unwrap_or(200),
                    Err(_) => 200,
                };
                return ScrapeOutcome::success(url, Method::Cached, status, content, url.to_string())
                    .timed(start);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(url = %url, "Cache lookup failed, scraping instead: {}", e);
                warnings.push(format!("cache lookup failed: {}", e));
            }
        }

        let mut outcome = self.scrape(url, strategy, options).await;
        for warning in warnings {
            outcome.add_warning(warning);
        }

        if outcome.success {
            if let Some(content) = &outcome.content {
                let metadata =
                    PutMetadata::scraped(outcome.final_method.as_str(), outcome.status_code);
                if let Err(e) = cache.put(url, content, metadata).await {
                    warn!(url = %url, "Failed to cache scraped page: {}", e);
                    outcome.add_warning(format!("failed to cache page: {}", e));
                }
            }
        }

        outcome.scrape_time = start.elapsed();
        outcome
    }
}
