//! Remote scraping API providers
//!
//! The engine talks to a provider through [`RemoteScraper`] so tests and
//! alternative services can stand in for [`FirecrawlClient`].

use crate::config::RemoteConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Headroom on top of the provider-side timeout before we give up locally
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Failure of a single remote API call
#[derive(Debug, Error)]
pub enum RemoteApiError {
    #[error("Remote API timed out: {0}")]
    Timeout(String),

    #[error("Remote API transport error: {0}")]
    Transport(String),

    #[error("Remote API error: {0}")]
    Provider(String),

    #[error("Unexpected remote API response: {0}")]
    MalformedResponse(String),

    #[error("Remote API returned HTTP {0}")]
    HttpStatus(u16),
}

impl RemoteApiError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::HttpStatus(code) => *code == 408 || *code == 504,
            _ => false,
        }
    }

    /// HTTP status worth reporting on the outcome
    pub fn status_code(&self) -> u16 {
        match self {
            Self::HttpStatus(code) => *code,
            _ => 500,
        }
    }
}

impl From<reqwest::Error> for RemoteApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Page content as returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePage {
    pub html: String,
    /// Final URL reported by the provider, when it reports one
    pub final_url: Option<String>,
}

#[async_trait]
pub trait RemoteScraper: Send + Sync {
    /// Fetches the raw HTML of `url`
    async fn scrape(&self, url: &str) -> Result<RemotePage, RemoteApiError>;

    /// Short provider name for logs
    fn name(&self) -> &str;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    only_main_content: bool,
    timeout: u64,
    max_age: u64,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeData {
    raw_html: Option<String>,
    metadata: Option<ScrapeMetadata>,
}

#[derive(Debug, Deserialize)]
struct ScrapeMetadata {
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
}

/// Client for the Firecrawl `/v1/scrape` endpoint
#[derive(Debug, Clone)]
pub struct FirecrawlClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout_ms: u64,
    max_age_ms: u64,
}

impl FirecrawlClient {
    pub fn new(api_key: impl Into<String>, config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms) + CLIENT_TIMEOUT_MARGIN)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/scrape", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            timeout_ms: config.timeout_ms,
            max_age_ms: config.max_age_ms,
        })
    }

    /// Builds a client when the configured environment variable holds a key
    pub fn from_env(config: &RemoteConfig) -> Result<Option<Self>, reqwest::Error> {
        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Self::new(key.trim(), config).map(Some),
            _ => Ok(None),
        }
    }

    fn interpret(status: u16, body: &str) -> Result<RemotePage, RemoteApiError> {
        let parsed: ScrapeResponse = match serde_json::from_str(body) {
            Ok(parsed) => parsed,
            Err(_) if !(200..300).contains(&status) => {
                return Err(RemoteApiError::HttpStatus(status))
            }
            Err(e) => return Err(RemoteApiError::MalformedResponse(e.to_string())),
        };

        if parsed.success {
            if let Some(data) = parsed.data {
                if let Some(html) = data.raw_html {
                    return Ok(RemotePage {
                        html,
                        final_url: data.metadata.and_then(|m| m.source_url),
                    });
                }
            }
        }

        if let Some(error) = parsed.error {
            let lower = error.to_lowercase();
            if status == 408 || lower.contains("timeout") || lower.contains("timed out") {
                return Err(RemoteApiError::Timeout(error));
            }
            return Err(RemoteApiError::Provider(error));
        }

        if !(200..300).contains(&status) {
            return Err(RemoteApiError::HttpStatus(status));
        }

        Err(RemoteApiError::MalformedResponse(
            "response carried neither rawHtml nor an error".to_string(),
        ))
    }
}

#[async_trait]
impl RemoteScraper for FirecrawlClient {
    async fn scrape(&self, url: &str) -> Result<RemotePage, RemoteApiError> {
        let request = ScrapeRequest {
            url,
            formats: ["rawHtml"],
            only_main_content: false,
            timeout: self.timeout_ms,
            max_age: self.max_age_ms,
        };

        debug!(url = %url, timeout_ms = self.timeout_ms, "Calling Firecrawl");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Self::interpret(status, &body)
    }

    fn name(&self) -> &str {
        "firecrawl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> RemoteConfig {
        RemoteConfig {
            base_url: server.uri(),
            timeout_ms: 2_000,
            ..RemoteConfig::default()
        }
    }

    #[test]
    fn test_interpret_success() {
        let page = FirecrawlClient::interpret(
            200,
            r#"{"success":true,"data":{"rawHtml":"<html>ok</html>","metadata":{"sourceURL":"https://a.example/"}}}"#,
        )
        .unwrap();
        assert_eq!(page.html, "<html>ok</html>");
        assert_eq!(page.final_url.as_deref(), Some("https://a.example/"));
    }

    #[test]
    fn test_interpret_provider_error() {
        let err = FirecrawlClient::interpret(200, r#"{"success":false,"error":"blocked"}"#)
            .unwrap_err();
        assert!(matches!(err, RemoteApiError::Provider(ref msg) if msg == "blocked"));
        assert!(!err.is_timeout());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_interpret_timeout_error() {
        let err = FirecrawlClient::interpret(
            408,
            r#"{"success":false,"error":"Request timed out"}"#,
        )
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_interpret_malformed() {
        let err = FirecrawlClient::interpret(200, r#"{"success":true,"data":{}}"#).unwrap_err();
        assert!(matches!(err, RemoteApiError::MalformedResponse(_)));

        let err = FirecrawlClient::interpret(200, "not json").unwrap_err();
        assert!(matches!(err, RemoteApiError::MalformedResponse(_)));
    }

    #[test]
    fn test_interpret_non_json_error_status() {
        let err = FirecrawlClient::interpret(502, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, RemoteApiError::HttpStatus(502)));
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_from_env_without_key() {
        let config = RemoteConfig {
            api_key_env: "QUARRY_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..RemoteConfig::default()
        };
        assert!(FirecrawlClient::from_env(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scrape_sends_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "url": "https://shop.example/p/1",
                "formats": ["rawHtml"],
                "onlyMainContent": false,
                "timeout": 2000,
                "maxAge": 14400000u64
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "rawHtml": "<html>remote</html>" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = FirecrawlClient::new("secret", &config_for(&server)).unwrap();
        let page = client.scrape("https://shop.example/p/1").await.unwrap();

        assert_eq!(page.html, "<html>remote</html>");
        assert_eq!(page.final_url, None);
    }

    #[tokio::test]
    async fn test_scrape_unreachable_provider() {
        let config = RemoteConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_ms: 500,
            ..RemoteConfig::default()
        };
        let client = FirecrawlClient::new("secret", &config).unwrap();

        let err = client.scrape("https://shop.example/").await.unwrap_err();
        assert!(matches!(
            err,
            RemoteApiError::Transport(_) | RemoteApiError::Timeout(_)
        ));
    }
}
