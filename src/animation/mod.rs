//! Animation lifecycle management.
//!
//! Gives animated components a shared way to schedule delayed, repeating
//! and per-frame work that is always canceled on teardown, and a global
//! performance mode that scales or disables animation under load.

mod handles;
mod manager;
mod mode;
mod monitor;

pub use handles::{ComponentToken, Handle, HandleKind, Observer, PendingCounts};
pub use manager::{AnimationManager, ComponentGuard, MemoryProbe, MemoryUsage, NoMemoryProbe};
pub use mode::{AnimationDelay, PerformanceMode};
pub use monitor::{FrameThresholds, PerformanceMonitor, PerformanceReport};
