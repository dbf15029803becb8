//! Rate limit policies.

use std::num::NonZeroU32;
use std::time::Duration;

use crate::error::{MarqueeError, Result};

/// How many requests an identifier may issue within one fixed window.
///
/// Valid ranges: `max_requests >= 1` and a window of at least one
/// millisecond. Both are checked at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_requests: NonZeroU32,
    window: Duration,
}

impl RateLimitPolicy {
    /// Create a new policy, rejecting values outside the valid ranges.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        let max_requests = NonZeroU32::new(max_requests).ok_or_else(|| {
            MarqueeError::InvalidPolicy("max_requests must be at least 1".to_string())
        })?;

        if window < Duration::from_millis(1) {
            return Err(MarqueeError::InvalidPolicy(format!(
                "window must be at least 1ms, got {:?}",
                window
            )));
        }

        Ok(Self {
            max_requests,
            window,
        })
    }

    /// Contact form policy: 5 requests per minute.
    pub fn contact() -> Self {
        Self {
            max_requests: NonZeroU32::MIN.saturating_add(4),
            window: Duration::from_secs(60),
        }
    }

    /// Quote form policy: 3 requests per five minutes.
    pub fn quote() -> Self {
        Self {
            max_requests: NonZeroU32::MIN.saturating_add(2),
            window: Duration::from_secs(300),
        }
    }

    /// Maximum requests allowed in one window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests.get()
    }

    /// Length of one window.
    pub fn window(&self) -> Duration {
        self.window
    }
}
