use std::collections::HashMap;

/// Name of the fallback entry used for keys without their own limits
pub const DEFAULT_KEY: &str = "default";

/// Per-key quota: both constraints apply over the same trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum admissions inside the window
    pub requests_per_minute: u32,

    /// Maximum summed cost units inside the window
    pub cost_per_minute: u64,
}

impl RateLimit {
    pub const fn new(requests_per_minute: u32, cost_per_minute: u64) -> Self {
        Self {
            requests_per_minute,
            cost_per_minute,
        }
    }
}

/// Static limits table
///
/// `firecrawl` guards the remote scraping API (one cost unit per call). The
/// model entries budget LLM calls in tokens for downstream stages that share
/// a limiter instance with the engine.
const BUILTIN_LIMITS: &[(&str, RateLimit)] = &[
    ("firecrawl", RateLimit::new(10, 10)),
    ("gpt-3.5-turbo", RateLimit::new(500, 200_000)),
    ("gpt-3.5-turbo-instruct", RateLimit::new(3500, 90_000)),
    ("gpt-4", RateLimit::new(500, 10_000)),
    ("gpt-4-turbo", RateLimit::new(500, 30_000)),
    ("gpt-4.1", RateLimit::new(500, 30_000)),
    (DEFAULT_KEY, RateLimit::new(500, 10_000)),
];

/// Builds the limits table a new limiter starts from
pub fn builtin_limits() -> HashMap<String, RateLimit> {
    BUILTIN_LIMITS
        .iter()
        .map(|(key, limit)| (key.to_string(), *limit))
        .collect()
}
