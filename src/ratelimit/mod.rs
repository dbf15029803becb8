//! Rate limiting logic and state management.

mod counter;
mod key;
mod limiter;
mod policy;

pub use counter::{CounterEntry, RateLimitDecision};
pub use key::{client_ip, RateLimitKey, UNKNOWN_CLIENT};
pub use limiter::RateLimiter;
pub use policy::RateLimitPolicy;
