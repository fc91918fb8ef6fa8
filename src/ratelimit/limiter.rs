use crate::config::RateLimitOverride;
use crate::ratelimit::limits::{builtin_limits, RateLimit, DEFAULT_KEY};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Length of the trailing window both constraints are measured over
pub const WINDOW: Duration = Duration::from_secs(60);

/// One admitted call inside the window
#[derive(Debug, Clone)]
struct Admission {
    at: Instant,
    cost: u64,
    /// Set once the real cost replaced the estimate
    resolved: bool,
}

/// Rolling admission history for a single key
///
/// Entries are appended in time order, so the front is always the oldest.
#[derive(Debug, Default)]
struct KeyState {
    admissions: VecDeque<Admission>,
}

impl KeyState {
    /// Drops admissions that have left the window
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.admissions.front() {
            if now.saturating_duration_since(front.at) >= window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    fn current_requests(&self) -> u32 {
        self.admissions.len() as u32
    }

    fn current_cost(&self) -> u64 {
        self.admissions.iter().map(|a| a.cost).sum()
    }

    fn time_until_expiry(admission: &Admission, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(admission.at))
    }

    /// Calculates how long a caller must wait before `estimated_cost` fits
    ///
    /// Assumes `purge` already ran for `now`. Returns zero when the call can
    /// be admitted immediately.
    fn wait_time(
        &self,
        limit: &RateLimit,
        estimated_cost: u64,
        now: Instant,
        window: Duration,
    ) -> Duration {
        let mut wait = Duration::ZERO;

        if self.current_requests() >= limit.requests_per_minute {
            if let Some(oldest) = self.admissions.front() {
                wait = wait.max(Self::time_until_expiry(oldest, now, window));
            }
        }

        let current_cost = self.current_cost();
        if current_cost + estimated_cost > limit.cost_per_minute {
            let needed = current_cost + estimated_cost - limit.cost_per_minute;
            let mut freed = 0;
            let mut until = None;

            for admission in &self.admissions {
                freed += admission.cost;
                if freed >= needed {
                    until = Some(Self::time_until_expiry(admission, now, window));
                    break;
                }
            }

            // A call larger than the whole budget waits for an empty window.
            let until = until.or_else(|| {
                self.admissions
                    .back()
                    .map(|newest| Self::time_until_expiry(newest, now, window))
            });

            if let Some(until) = until {
                wait = wait.max(until);
            }
        }

        wait
    }
}

/// Snapshot of a key's consumption inside the current window
#[derive(Debug, Clone, PartialEq)]
pub struct UsageStats {
    pub key: String,
    pub current_requests: u32,
    pub max_requests: u32,
    pub current_cost: u64,
    pub max_cost: u64,
    pub request_utilization: f64,
    pub cost_utilization: f64,
}

#[derive(Debug)]
struct Inner {
    limits: HashMap<String, RateLimit>,
    states: HashMap<String, KeyState>,
}

impl Inner {
    fn limit_for(&self, key: &str) -> RateLimit {
        self.limits
            .get(key)
            .or_else(|| self.limits.get(DEFAULT_KEY))
            .copied()
            .unwrap_or(RateLimit::new(500, 10_000))
    }
}

/// Dual sliding-window rate limiter
///
/// Each key is bounded both by the number of admissions and by the summed
/// cost units admitted within the trailing window. One instance is meant to
/// be shared (behind an `Arc`) by every caller drawing on the same budget.
///
/// A single mutex guards all bookkeeping. Waiting happens with the mutex
/// released, so callers on unrelated keys never queue behind each other.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<Inner>,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter using the builtin limits table and a 60 second window
    pub fn new() -> Self {
        Self::with_window(WINDOW)
    }

    /// Creates a limiter with a custom window length
    pub fn with_window(window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                limits: builtin_limits(),
                states: HashMap::new(),
            }),
            window,
        }
    }

    /// Creates a limiter with the builtin table plus configured overrides
    pub fn from_overrides(overrides: &[RateLimitOverride]) -> Self {
        let limiter = Self::new();
        for entry in overrides {
            limiter.set_limits(
                &entry.key,
                RateLimit::new(entry.requests_per_minute, entry.cost_per_minute),
            );
        }
        limiter
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the limits for a key (custom quotas)
    pub fn set_limits(&self, key: &str, limit: RateLimit) {
        self.lock().limits.insert(key.to_string(), limit);
        tracing::info!(
            "Set custom limits for {}: requests/min={}, cost/min={}",
            key,
            limit.requests_per_minute,
            limit.cost_per_minute
        );
    }

    /// Returns the limits in effect for a key, falling back to the default entry
    pub fn limits(&self, key: &str) -> RateLimit {
        self.lock().limit_for(key)
    }

    /// Waits until a call costing `estimated_cost` fits both constraints, then records it
    ///
    /// The wait is recomputed after every sleep, since other callers may have
    /// been admitted in the meantime.
    ///
    /// # Arguments
    ///
    /// * `key` - Rate-limit key, usually a provider name; unknown keys use the default limits
    /// * `estimated_cost` - Units charged against the key's cost budget
    ///
    /// # Example
    ///
    /// ```no_run
    /// use quarry::RateLimiter;
    ///
    /// # async fn demo() {
    /// let limiter = RateLimiter::new();
    /// limiter.acquire("firecrawl", 1).await;
    /// // safe to call the provider now
    /// # }
    /// ```
    pub async fn acquire(&self, key: &str, estimated_cost: u64) {
        loop {
            let wait = {
                let mut inner = self.lock();
                let limit = inner.limit_for(key);
                let now = Instant::now();
                let state = inner.states.entry(key.to_string()).or_default();
                state.purge(now, self.window);

                let wait = state.wait_time(&limit, estimated_cost, now, self.window);
                if wait.is_zero() {
                    state.admissions.push_back(Admission {
                        at: now,
                        cost: estimated_cost,
                        resolved: false,
                    });
                    tracing::debug!(
                        "Acquired rate limit for {}: requests={}/{}, cost={}/{}",
                        key,
                        state.current_requests(),
                        limit.requests_per_minute,
                        state.current_cost(),
                        limit.cost_per_minute
                    );
                    return;
                }
                wait
            };

            tracing::info!(
                "Rate limit reached for {}, waiting {:.2}s",
                key,
                wait.as_secs_f64()
            );
            sleep(wait).await;
        }
    }

    /// Replaces the estimate of the most recent unresolved call with its real cost
    ///
    /// Does nothing if that call has already left the window.
    pub fn update_actual_cost(&self, key: &str, actual: u64, estimated: u64) {
        let mut inner = self.lock();
        let Some(state) = inner.states.get_mut(key) else {
            return;
        };
        state.purge(Instant::now(), self.window);

        if let Some(admission) = state.admissions.iter_mut().rev().find(|a| !a.resolved) {
            if admission.cost != estimated {
                tracing::debug!(
                    "Recorded estimate for {} was {}, caller reported {}",
                    key,
                    admission.cost,
                    estimated
                );
            }
            admission.cost = actual;
            admission.resolved = true;
            tracing::debug!(
                "Updated cost for {}: estimated={}, actual={}",
                key,
                estimated,
                actual
            );
        }
    }

    /// Reports current consumption for a key
    pub fn usage(&self, key: &str) -> UsageStats {
        let mut inner = self.lock();
        let limit = inner.limit_for(key);
        let state = inner.states.entry(key.to_string()).or_default();
        state.purge(Instant::now(), self.window);

        let current_requests = state.current_requests();
        let current_cost = state.current_cost();

        UsageStats {
            key: key.to_string(),
            current_requests,
            max_requests: limit.requests_per_minute,
            current_cost,
            max_cost: limit.cost_per_minute,
            request_utilization: current_requests as f64 / limit.requests_per_minute.max(1) as f64,
            cost_utilization: current_cost as f64 / limit.cost_per_minute.max(1) as f64,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
