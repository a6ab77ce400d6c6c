use crate::domain::ports::ClockRef;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// A fixed-window policy: at most `max` requests per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePolicy {
    pub window_secs: i64,
    pub max: u32,
}

impl RatePolicy {
    pub const fn new(window_secs: i64, max: u32) -> Self {
        Self { window_secs, max }
    }

    pub const fn per_minute(max: u32) -> Self {
        Self::new(60, max)
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }
}

/// Webhook ingestion is generous: the provider retries aggressively.
pub const WEBHOOK: RatePolicy = RatePolicy::per_minute(100);
/// Payment initiation and polling.
pub const PAYMENT: RatePolicy = RatePolicy::per_minute(30);
/// Credential exchange is very strict: 5 per 15 minutes.
pub const CREDENTIAL: RatePolicy = RatePolicy::new(15 * 60, 5);
/// Default policy for everything else.
pub const API: RatePolicy = RatePolicy::per_minute(60);

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub limited: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Seconds until the window resets, as of the check.
    pub retry_after_secs: u64,
}

struct RateWindow {
    count: u32,
    reset_at: DateTime<Utc>,
    span: Duration,
}

/// Per-identifier fixed-window request counter.
///
/// State is process-local and best-effort: it resets on restart and is not
/// shared across horizontally scaled instances, which is acceptable for
/// abuse mitigation but not for billing-grade accounting. The instance is
/// passed explicitly to every handler that gates on it.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, RateWindow>>,
    clock: ClockRef,
}

impl RateLimiter {
    pub fn new(clock: ClockRef) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Counts the request against `identifier` and reports whether it is
    /// over the policy. Must run before any credential lookup or external
    /// call.
    pub fn check(&self, identifier: &str, policy: RatePolicy) -> RateDecision {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap();

        let window = windows
            .entry(identifier.to_string())
            .and_modify(|w| {
                if now >= w.reset_at {
                    w.count = 0;
                    w.reset_at = now + policy.window();
                    w.span = policy.window();
                }
            })
            .or_insert_with(|| RateWindow {
                count: 0,
                reset_at: now + policy.window(),
                span: policy.window(),
            });

        window.count += 1;
        RateDecision {
            limited: window.count > policy.max,
            remaining: policy.max.saturating_sub(window.count),
            reset_at: window.reset_at,
            retry_after_secs: (window.reset_at - now).num_seconds().max(0) as u64,
        }
    }

    /// Evicts windows stale by more than one extra window length, keyed on
    /// each window's own span. Returns the eviction count.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap();
        let before = windows.len();
        windows.retain(|_, w| now < w.reset_at + w.span);
        let removed = before - windows.len();
        if removed > 0 {
            tracing::debug!(removed, "evicted stale rate windows");
        }
        removed
    }

    #[cfg(test)]
    fn window_count(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

/// Builds the rate-limit identifier for a request: caller ip plus tenant
/// when known, so one noisy tenant cannot exhaust an ip-wide budget.
pub fn client_identifier(ip: &str, tenant_id: Option<&str>) -> String {
    match tenant_id {
        Some(tenant) => format!("{ip}:{tenant}"),
        None => ip.to_string(),
    }
}
