//! Direct HTTP fetching with stealth headers and retries
//!
//! Each call makes up to `retries` attempts. Before every attempt the shared
//! stealth profile may be re-sampled; retries wait a randomized delay first.
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 404 | Immediate NotFound, no retry |
//! | Other 4xx/5xx | Immediate HttpError, no retry |
//! | Bot interstitial | Retry; 403 BotDetected once attempts run out |
//! | Connection error / timeout | Retry; Transport once attempts run out |
//! | Anything else | Success, with page issues recorded |

use crate::config::{DetectionConfig, ScraperConfig};
use crate::scraper::detection::Detector;
use crate::scraper::outcome::{FailureKind, Method, PageIssue, ScrapeOutcome};
use crate::scraper::stealth::{referer_for, StealthProfile};
use rand::Rng;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Builds the HTTP client used for direct fetches
///
/// Redirects are followed (up to 10 hops) and compressed bodies are decoded.
/// Headers are supplied per request from the active [`StealthProfile`].
pub fn build_http_client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(request_timeout)
        .connect_timeout(request_timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Picks a retry delay uniformly from `[min, max]`
pub fn random_delay((min, max): (Duration, Duration)) -> Duration {
    let min_ms = min.as_millis() as u64;
    let max_ms = (max.as_millis() as u64).max(min_ms);
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Direct-path fetcher shared by every scrape on one engine
pub(crate) struct DirectFetcher {
    client: Client,
    detector: Detector,
    profile: Mutex<StealthProfile>,
    rotation_probability: f64,
}

impl DirectFetcher {
    pub fn new(scraper: &ScraperConfig, detection: &DetectionConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(scraper.request_timeout_secs))?,
            detector: Detector::new(detection, scraper.min_content_length),
            profile: Mutex::new(StealthProfile::random()),
            rotation_probability: scraper.rotation_probability.clamp(0.0, 1.0),
        })
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Profile for the next attempt, re-sampled with the rotation probability
    fn profile_for_attempt(&self) -> StealthProfile {
        let mut profile = self.profile.lock().unwrap_or_else(|e| e.into_inner());
        if rand::thread_rng().gen_bool(self.rotation_probability) {
            *profile = StealthProfile::random();
            debug!(user_agent = profile.user_agent, "Rotated stealth profile");
        }
        profile.clone()
    }

    pub async fn scrape(
        &self,
        url: &str,
        retries: u32,
        delay_range: (Duration, Duration),
    ) -> ScrapeOutcome {
        let start = Instant::now();
        let retries = retries.max(1);
        let referer = referer_for(url);

        let mut seen_issues: Vec<PageIssue> = Vec::new();
        let mut last_error = String::from("no attempt completed");
        let mut timed_out = false;

        for attempt in 0..retries {
            if attempt > 0 {
                let delay = random_delay(delay_range);
                info!(
                    url = %url,
                    "Retry {}/{} after {:.1}s",
                    attempt + 1,
                    retries,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            let headers = self.profile_for_attempt().headers(referer.as_deref());
            let attempts = attempt + 1;

            let response = match self.client.get(url).headers(headers).send().await {
                Ok(response) => response,
                Err(e) => {
                    error!(url = %url, "Request failed on attempt {}/{}: {}", attempts, retries, e);
                    timed_out = e.is_timeout();
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            let final_url = response.url().to_string();

            if status == StatusCode::NOT_FOUND {
                info!(url = %url, "Page not found");
                return ScrapeOutcome::failure(url, Method::Direct, FailureKind::NotFound, "Page not found (404)")
                    .with_status(Some(status.as_u16()))
                    .with_final_url(final_url)
                    .with_attempts(attempts)
                    .with_issues(seen_issues)
                    .timed(start);
            }

            if status.is_client_error() || status.is_server_error() {
                warn!(url = %url, status = status.as_u16(), "HTTP error");
                return ScrapeOutcome::failure(
                    url,
                    Method::Direct,
                    FailureKind::HttpError,
                    format!("HTTP {}", status.as_u16()),
                )
                .with_status(Some(status.as_u16()))
                .with_final_url(final_url)
                .with_attempts(attempts)
                .with_issues(seen_issues)
                .timed(start);
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    error!(url = %url, "Failed to read body on attempt {}/{}: {}", attempts, retries, e);
                    timed_out = e.is_timeout();
                    last_error = e.to_string();
                    continue;
                }
            };

            let analysis = self.detector.analyze(&body);

            if analysis.bot_detected {
                for issue in analysis.issues() {
                    if !seen_issues.contains(&issue) {
                        seen_issues.push(issue);
                    }
                }
                warn!(
                    url = %url,
                    captcha = ?analysis.captcha.kinds,
                    "Bot detection on attempt {}/{}",
                    attempts,
                    retries
                );
                if attempts == retries {
                    return ScrapeOutcome::failure(
                        url,
                        Method::Direct,
                        FailureKind::BotDetected,
                        format!("Bot detection persisted after {} attempts", retries),
                    )
                    .with_status(Some(StatusCode::FORBIDDEN.as_u16()))
                    .with_final_url(final_url)
                    .with_attempts(attempts)
                    .with_issues(seen_issues)
                    .timed(start);
                }
                continue;
            }

            // Earlier interstitials are moot once a real page came back
            info!(url = %url, bytes = body.len(), "Fetched directly");
            return ScrapeOutcome::success(url, Method::Direct, status.as_u16(), body, final_url)
                .with_attempts(attempts)
                .with_issues(analysis.issues())
                .timed(start);
        }

        if timed_out && !seen_issues.contains(&PageIssue::Timeout) {
            seen_issues.push(PageIssue::Timeout);
        }

        ScrapeOutcome::failure(
            url,
            Method::Direct,
            FailureKind::Transport { timeout: timed_out },
            format!("Request failed after {} attempts: {}", retries, last_error),
        )
        .with_attempts(retries)
        .with_issues(seen_issues)
        .timed(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NO_DELAY: (Duration, Duration) = (Duration::ZERO, Duration::ZERO);

    fn fetcher() -> DirectFetcher {
        let scraper = ScraperConfig {
            request_timeout_secs: 2,
            ..ScraperConfig::default()
        };
        DirectFetcher::new(&scraper, &DetectionConfig::default()).unwrap()
    }

    fn product_page() -> String {
        format!(
            "<html><head><title>Widget</title></head><body>{}</body></html>",
            "<p>A sturdy widget with many useful features.</p>".repeat(5)
        )
    }

    #[test]
    fn test_random_delay_within_range() {
        let range = (Duration::from_millis(10), Duration::from_millis(20));
        for _ in 0..100 {
            let delay = random_delay(range);
            assert!(delay >= range.0 && delay <= range.1);
        }
        assert_eq!(random_delay(NO_DELAY), Duration::ZERO);
    }

    #[test]
    fn test_random_delay_inverted_range() {
        let delay = random_delay((Duration::from_millis(30), Duration::from_millis(5)));
        assert_eq!(delay, Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_success_sends_stealth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .and(header_exists("user-agent"))
            .and(header_exists("accept-language"))
            .and(header_exists("referer"))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page()))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/item", server.uri());
        let outcome = fetcher().scrape(&url, 3, NO_DELAY).await;

        assert!(outcome.success);
        assert_eq!(outcome.status_code, Some(200));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.final_method, Method::Direct);
        assert!(outcome.page_issues.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/gone", server.uri());
        let outcome = fetcher().scrape(&url, 3, NO_DELAY).await;

        assert!(!outcome.success);
        assert!(outcome.is_not_found());
        assert_eq!(outcome.status_code, Some(404));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_server_error_returns_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = fetcher().scrape(&server.uri(), 3, NO_DELAY).await;

        assert_eq!(outcome.failure, Some(FailureKind::HttpError));
        assert_eq!(outcome.status_code, Some(503));
    }

    #[tokio::test]
    async fn test_persistent_bot_detection_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><h1>Pardon Our Interruption</h1></body></html>"),
            )
            .expect(3)
            .mount(&server)
            .await;

        let outcome = fetcher().scrape(&server.uri(), 3, NO_DELAY).await;

        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::BotDetected));
        assert_eq!(outcome.status_code, Some(403));
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.has_issue(PageIssue::BotDetected));
    }

    #[tokio::test]
    async fn test_bot_detection_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>Verify you are human</body></html>"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page()))
            .mount(&server)
            .await;

        let outcome = fetcher().scrape(&server.uri(), 3, NO_DELAY).await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert!(!outcome.has_issue(PageIssue::BotDetected));
    }

    #[tokio::test]
    async fn test_short_body_is_success_with_issue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
            .mount(&server)
            .await;

        let outcome = fetcher().scrape(&server.uri(), 1, NO_DELAY).await;

        assert!(outcome.success);
        assert_eq!(outcome.content.as_deref(), Some("<p>hi</p>"));
        assert!(outcome.has_issue(PageIssue::EmptyContent));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let outcome = fetcher().scrape("http://127.0.0.1:1/", 2, NO_DELAY).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, None);
        assert!(matches!(outcome.failure, Some(FailureKind::Transport { .. })));
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(product_page())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let outcome = fetcher().scrape(&server.uri(), 1, NO_DELAY).await;

        assert_eq!(outcome.failure, Some(FailureKind::Transport { timeout: true }));
        assert!(outcome.has_issue(PageIssue::Timeout));
        assert_eq!(outcome.status_code, None);
    }
}
