//! Browser-like request fingerprints for direct fetches
//!
//! A [`StealthProfile`] is one consistent set of browser attributes. Headers
//! built from the same profile always agree with each other (the language
//! header matches the sampled locale, and so on).

use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use url::Url;

const WINDOW_SIZES: [(u32, u32); 5] = [
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1440, 900),
    (1280, 720),
];

const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

const LANGUAGES: [&str; 4] = [
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,es;q=0.6",
    "en-CA,en;q=0.9,fr;q=0.7",
];

const TIMEZONES: [&str; 5] = [
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
    "Europe/London",
];

const SCREEN_RESOLUTIONS: [(u32, u32); 5] = [
    (1920, 1080),
    (2560, 1440),
    (1366, 768),
    (1536, 864),
    (1440, 900),
];

const COLOR_DEPTHS: [u8; 2] = [24, 32];

const PIXEL_RATIOS: [f32; 4] = [1.0, 1.25, 1.5, 2.0];

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

fn pick<T: Copy, R: Rng + ?Sized>(rng: &mut R, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

/// One sampled browser fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct StealthProfile {
    pub user_agent: &'static str,
    pub window_size: (u32, u32),
    pub accept_language: &'static str,
    pub timezone: &'static str,
    pub screen_resolution: (u32, u32),
    pub color_depth: u8,
    pub pixel_ratio: f32,
}

impl StealthProfile {
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            user_agent: pick(rng, &USER_AGENTS),
            window_size: pick(rng, &WINDOW_SIZES),
            accept_language: pick(rng, &LANGUAGES),
            timezone: pick(rng, &TIMEZONES),
            screen_resolution: pick(rng, &SCREEN_RESOLUTIONS),
            color_depth: pick(rng, &COLOR_DEPTHS),
            pixel_ratio: pick(rng, &PIXEL_RATIOS),
        }
    }

    pub fn random() -> Self {
        Self::sample(&mut rand::thread_rng())
    }

    /// Request headers a browser with this profile would send
    pub fn headers(&self, referer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(self.user_agent));
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(self.accept_language),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("document"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-mode"),
            HeaderValue::from_static("navigate"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static(if referer.is_some() { "same-origin" } else { "none" }),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-user"),
            HeaderValue::from_static("?1"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        if let Some(value) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
            headers.insert(header::REFERER, value);
        }

        headers
    }
}

/// The site root of `url`, used as a plausible referer
pub fn referer_for(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
        None => format!("{}://{}/", parsed.scheme(), host),
    })
}
