//! Result types shared by every fetch path
//!
//! A scrape never returns an error: every per-URL failure is a
//! [`ScrapeOutcome`] tagged with a [`FailureKind`].

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

/// How a page was (or was attempted to be) obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// Plain HTTP from this process with a stealth profile
    Direct,
    /// Third-party scraping service
    RemoteApi,
    /// Served from the local cache
    Cached,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::RemoteApi => "remote_api",
            Self::Cached => "cached",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method-selection policy requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Direct first, remote API only when direct is blocked or fails
    #[default]
    Auto,
    Direct,
    RemoteApi,
}

impl Strategy {
    /// Methods to try, in order; later entries are fallbacks
    pub fn plan(&self) -> &'static [Method] {
        match self {
            Self::Auto => &[Method::Direct, Method::RemoteApi],
            Self::Direct => &[Method::Direct],
            Self::RemoteApi => &[Method::RemoteApi],
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "direct" | "requests" => Ok(Self::Direct),
            "remote" | "remote_api" | "firecrawl" => Ok(Self::RemoteApi),
            other => Err(format!("unknown scrape method '{}'", other)),
        }
    }
}

/// Problems noticed on a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageIssue {
    BotDetected,
    CaptchaPresent,
    EmptyContent,
    ErrorPage,
    Timeout,
    JsRequired,
}

impl PageIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BotDetected => "bot_detected",
            Self::CaptchaPresent => "captcha_present",
            Self::EmptyContent => "empty_content",
            Self::ErrorPage => "error_page",
            Self::Timeout => "timeout",
            Self::JsRequired => "javascript_required",
        }
    }
}

/// Why a scrape failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 404; terminal, never retried or escalated
    NotFound,
    /// Any other 4xx/5xx from the target
    HttpError,
    /// Connection or timeout failure after all retries
    Transport { timeout: bool },
    /// Anti-bot interstitial on every attempt
    BotDetected,
    /// Remote scraping API call failed
    RemoteApi { timeout: bool },
    /// Remote API requested but no key configured
    RemoteUnavailable,
}

/// Uniform result of one scrape call
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOutcome {
    /// URL the caller asked for
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub content: Option<String>,
    /// URL after redirects
    pub final_url: String,
    pub methods_tried: BTreeSet<Method>,
    pub final_method: Method,
    pub error_reason: Option<String>,
    pub failure: Option<FailureKind>,
    pub page_issues: Vec<PageIssue>,
    pub scrape_time: Duration,
    pub attempts: u32,
    pub warnings: Vec<String>,
}

impl ScrapeOutcome {
    fn base(url: &str, method: Method) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            status_code: None,
            content: None,
            final_url: url.to_string(),
            methods_tried: BTreeSet::from([method]),
            final_method: method,
            error_reason: None,
            failure: None,
            page_issues: Vec::new(),
            scrape_time: Duration::ZERO,
            attempts: 1,
            warnings: Vec::new(),
        }
    }

    /// A successful fetch
    pub fn success(
        url: &str,
        method: Method,
        status_code: u16,
        content: String,
        final_url: String,
    ) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            content: Some(content),
            final_url,
            ..Self::base(url, method)
        }
    }

    /// A failed fetch
    pub fn failure(
        url: &str,
        method: Method,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            error_reason: Some(reason.into()),
            failure: Some(kind),
            ..Self::base(url, method)
        }
    }

    pub fn with_status(mut self, status_code: Option<u16>) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Stamps the elapsed time since `start`
    pub fn timed(mut self, start: Instant) -> Self {
        self.scrape_time = start.elapsed();
        self
    }

    pub fn with_issues(mut self, issues: impl IntoIterator<Item = PageIssue>) -> Self {
        for issue in issues {
            self.add_issue(issue);
        }
        self
    }

    /// Records an issue once
    pub fn add_issue(&mut self, issue: PageIssue) {
        if !self.page_issues.contains(&issue) {
            self.page_issues.push(issue);
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn has_issue(&self, issue: PageIssue) -> bool {
        self.page_issues.contains(&issue)
    }

    pub fn is_not_found(&self) -> bool {
        self.failure == Some(FailureKind::NotFound)
    }

    /// Folds an earlier attempt's bookkeeping into this (later) outcome
    ///
    /// The later outcome's result fields win; methods, attempts, issues and
    /// warnings accumulate.
    pub fn merged_with(mut self, earlier: ScrapeOutcome) -> Self {
        self.methods_tried.extend(earlier.methods_tried);
        self.attempts += earlier.attempts;
        self.scrape_time += earlier.scrape_time;

        let mut issues = earlier.page_issues;
        for issue in self.page_issues.drain(..) {
            if !issues.contains(&issue) {
                issues.push(issue);
            }
        }
        self.page_issues = issues;

        let mut warnings = earlier.warnings;
        warnings.append(&mut self.warnings);
        self.warnings = warnings;

        self
    }
}
