//! Rate limiting for shared budgets
//!
//! A [`RateLimiter`] enforces two trailing-window constraints per resource
//! key (a model name, a target host, an API tier):
//! - admissions per window
//! - summed cost units per window
//!
//! Expired entries are purged lazily whenever a key is touched; there is no
//! background timer.

mod limiter;
mod limits;

pub use limiter::{RateLimiter, UsageStats, WINDOW};
pub use limits::{builtin_limits, RateLimit, DEFAULT_KEY};
