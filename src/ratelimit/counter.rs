//! Fixed-window counter entries.

use std::time::{Duration, Instant};

/// Requests seen for one identifier in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Requests counted in this window, including denied ones
    pub count: u32,
    /// End of the window
    pub reset_at: Instant,
}

impl CounterEntry {
    /// Open a new window at `now` with one request counted.
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
        }
    }

    /// An entry expires strictly after its reset instant.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }

    /// Time left in the window, saturating at zero.
    pub fn remaining_window(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub success: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Seconds until the window resets, rounded up
    pub reset_in: u64,
}

/// Round a duration up to whole seconds.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    millis.div_ceil(1000) as u64
}
