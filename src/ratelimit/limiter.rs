//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Instant;
use tracing::{debug, trace};

use super::counter::{ceil_secs, CounterEntry, RateLimitDecision};
use super::policy::RateLimitPolicy;

/// An in-memory, per-process fixed-window rate limiter.
///
/// Each identifier owns at most one counter. A window opens on the first
/// request (or the first request after expiry) and counts every request
/// until it ends. Because windows are fixed, a client can spend its whole
/// budget just before a window ends and again right after it, doubling
/// throughput across the boundary.
///
/// Counters are local to this instance; separate processes do not share
/// budgets.
pub struct RateLimiter {
    /// Counters indexed by caller-chosen identifier
    counters: DashMap<String, CounterEntry>,
}

impl RateLimiter {
    /// Create an empty rate limiter.
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Check and count a request for `identifier` against the wall clock.
    pub fn check_rate_limit(&self, identifier: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        self.check_rate_limit_at(identifier, policy, Instant::now())
    }

    /// Check and count a request for `identifier` as of `now`.
    ///
    /// The identifier must already encode every dimension the caller wants
    /// isolated, e.g. `"contact:203.0.113.7"`.
    pub fn check_rate_limit_at(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: Instant,
    ) -> RateLimitDecision {
        let max_requests = policy.max_requests();

        trace!(identifier = %identifier, max_requests, "Checking rate limit");

        match self.counters.entry(identifier.to_string()) {
            Entry::Vacant(vacant) => {
                debug!(identifier = %identifier, window = ?policy.window(), "Opening rate limit window");
                vacant.insert(CounterEntry::open(now, policy.window()));
                Self::fresh_window(policy)
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();

                if entry.is_expired(now) {
                    debug!(identifier = %identifier, window = ?policy.window(), "Rate limit window expired, reopening");
                    *entry = CounterEntry::open(now, policy.window());
                    return Self::fresh_window(policy);
                }

                entry.count = entry.count.saturating_add(1);
                let reset_in = ceil_secs(entry.remaining_window(now));

                if entry.count > max_requests {
                    debug!(
                        identifier = %identifier,
                        count = entry.count,
                        limit = max_requests,
                        reset_in,
                        "Rate limit exceeded"
                    );
                    RateLimitDecision {
                        success: false,
                        remaining: 0,
                        reset_in,
                    }
                } else {
                    RateLimitDecision {
                        success: true,
                        remaining: max_requests - entry.count,
                        reset_in,
                    }
                }
            }
        }
    }

    fn fresh_window(policy: &RateLimitPolicy) -> RateLimitDecision {
        RateLimitDecision {
            success: true,
            remaining: policy.max_requests() - 1,
            reset_in: ceil_secs(policy.window()),
        }
    }

    /// Remove every counter whose window has expired as of `now`.
    ///
    /// Returns the number of counters removed. Stale counters are harmless
    /// (the next check reopens them), so hosts may call this on any cadence.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.counters.len());

        if removed > 0 {
            debug!(removed, remaining = self.counters.len(), "Swept expired rate limit counters");
        }

        removed
    }

    /// Get the current count for an identifier.
    ///
    /// Returns `None` if no counter exists for the identifier.
    pub fn get_count(&self, identifier: &str) -> Option<u32> {
        self.counters.get(identifier).map(|entry| entry.count)
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Get the number of live counters.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(max: u32, window_ms: u64) -> RateLimitPolicy {
        RateLimitPolicy::new(max, Duration::from_millis(window_ms)).unwrap()
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.counter_count(), 0);
    }

    #[test]
    fn test_first_request_opens_window() {
        let limiter = RateLimiter::new();
        let policy = policy(5, 60_000);

        let decision = limiter.check_rate_limit("contact:1.2.3.4", &policy);

        assert!(decision.success);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_in, 60);
        assert_eq!(limiter.counter_count(), 1);
        assert_eq!(limiter.get_count("contact:1.2.3.4"), Some(1));
    }

    #[test]
    fn test_max_requests_allowed_then_denied() {
        let limiter = RateLimiter::new();
        let policy = policy(5, 60_000);
        let start = Instant::now();

        for i in 0..5u32 {
            let now = start + Duration::from_millis(u64::from(i) * 100);
            let decision = limiter.check_rate_limit_at("k", &policy, now);
            assert!(decision.success, "Request {} should be allowed", i + 1);
            assert_eq!(decision.remaining, 4 - i);
        }

        let decision = limiter.check_rate_limit_at("k", &policy, start + Duration::from_millis(1500));
        assert!(!decision.success);
        assert_eq!(decision.remaining, 0);
        // 58.5s left in the window rounds up
        assert_eq!(decision.reset_in, 59);
    }

    #[test]
    fn test_denied_requests_still_count() {
        let limiter = RateLimiter::new();
        let policy = policy(1, 1_000);
        let start = Instant::now();

        limiter.check_rate_limit_at("k", &policy, start);
        limiter.check_rate_limit_at("k", &policy, start);
        limiter.check_rate_limit_at("k", &policy, start);

        assert_eq!(limiter.get_count("k"), Some(3));
    }

    #[test]
    fn test_window_reopens_after_reset_in() {
        let limiter = RateLimiter::new();
        let policy = policy(3, 300_000);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_rate_limit_at("quote:9.9.9.9", &policy, start).success);
        }
        let denied = limiter.check_rate_limit_at("quote:9.9.9.9", &policy, start);
        assert!(!denied.success);
        assert_eq!(denied.reset_in, 300);

        let later = start + Duration::from_secs(denied.reset_in) + Duration::from_millis(1);
        let decision = limiter.check_rate_limit_at("quote:9.9.9.9", &policy, later);
        assert!(decision.success);
        assert_eq!(decision.remaining, 2);
        assert_eq!(limiter.get_count("quote:9.9.9.9"), Some(1));
    }

    #[test]
    fn test_window_still_live_at_reset_instant() {
        let limiter = RateLimiter::new();
        let policy = policy(1, 1_000);
        let start = Instant::now();

        assert!(limiter.check_rate_limit_at("k", &policy, start).success);

        let at_reset = limiter.check_rate_limit_at("k", &policy, start + Duration::from_secs(1));
        assert!(!at_reset.success);
        assert_eq!(at_reset.reset_in, 0);
    }

    #[test]
    fn test_boundary_burst_is_allowed() {
        let limiter = RateLimiter::new();
        let policy = policy(2, 1_000);
        let start = Instant::now();

        // Spend the budget at the very end of one window...
        let late = start + Duration::from_millis(999);
        assert!(limiter.check_rate_limit_at("k", &policy, start).success);
        assert!(limiter.check_rate_limit_at("k", &policy, late).success);
        assert!(!limiter.check_rate_limit_at("k", &policy, late).success);

        // ...and again immediately after it ends
        let next = start + Duration::from_millis(1_001);
        assert!(limiter.check_rate_limit_at("k", &policy, next).success);
        assert!(limiter.check_rate_limit_at("k", &policy, next).success);
    }

    #[test]
    fn test_identifiers_are_isolated() {
        let limiter = RateLimiter::new();
        let policy = policy(1, 60_000);
        let now = Instant::now();

        assert!(limiter.check_rate_limit_at("contact:1.1.1.1", &policy, now).success);
        assert!(!limiter.check_rate_limit_at("contact:1.1.1.1", &policy, now).success);

        assert!(limiter.check_rate_limit_at("contact:2.2.2.2", &policy, now).success);
        assert!(limiter.check_rate_limit_at("quote:1.1.1.1", &policy, now).success);

        assert_eq!(limiter.get_count("contact:1.1.1.1"), Some(2));
        assert_eq!(limiter.get_count("contact:2.2.2.2"), Some(1));
        assert_eq!(limiter.get_count("quote:1.1.1.1"), Some(1));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.check_rate_limit_at("short", &policy(5, 1_000), start);
        limiter.check_rate_limit_at("long", &policy(5, 600_000), start);

        assert_eq!(limiter.sweep_expired(start + Duration::from_millis(500)), 0);
        assert_eq!(limiter.counter_count(), 2);

        assert_eq!(limiter.sweep_expired(start + Duration::from_secs(2)), 1);
        assert_eq!(limiter.get_count("short"), None);
        assert_eq!(limiter.get_count("long"), Some(1));
    }

    #[test]
    fn test_sweep_on_empty_store() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.sweep_expired(Instant::now()), 0);
    }

    #[test]
    fn test_clear_counters() {
        let limiter = RateLimiter::new();
        limiter.check_rate_limit("k", &RateLimitPolicy::contact());
        assert_eq!(limiter.counter_count(), 1);

        limiter.clear();
        assert_eq!(limiter.counter_count(), 0);
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let a = RateLimiter::new();
        let b = RateLimiter::new();
        let policy = policy(1, 60_000);

        assert!(a.check_rate_limit("k", &policy).success);
        assert!(b.check_rate_limit("k", &policy).success);
    }
}
