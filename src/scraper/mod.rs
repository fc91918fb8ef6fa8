//! Page fetching: direct HTTP with stealth, remote API fallback
//!
//! This module contains:
//! - [`ScrapeEngine`], which picks methods per [`Strategy`] and never fails
//! - the direct fetcher with retries and profile rotation
//! - [`RemoteScraper`] providers, bounded by a [`ConcurrencyGovernor`]
//! - page classification ([`Detector`])

mod detection;
mod direct;
mod engine;
mod governor;
mod outcome;
mod remote;
mod stealth;

pub use detection::{extract_title, CaptchaReport, Detector, PageAnalysis};
pub use direct::{build_http_client, random_delay};
pub use engine::{should_fall_back, ScrapeEngine, ScrapeOptions};
pub use governor::ConcurrencyGovernor;
pub use outcome::{FailureKind, Method, PageIssue, ScrapeOutcome, Strategy};
pub use remote::{FirecrawlClient, RemoteApiError, RemotePage, RemoteScraper};
pub use stealth::{referer_for, StealthProfile};
