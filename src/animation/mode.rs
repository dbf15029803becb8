//! Global performance modes and the delays they produce.

use std::fmt;
use std::time::Duration;

use super::monitor::PerformanceReport;

/// Global degrade level, ordered from nominal to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PerformanceMode {
    /// Nominal: delays are used as requested
    #[default]
    High,
    /// Frame times are elevated: delays doubled
    Medium,
    /// Frame times are poor: delays tripled
    Low,
    /// Animation is disabled outright
    Emergency,
}

impl PerformanceMode {
    /// Factor applied to requested delays, or `None` when animation is off.
    pub fn delay_multiplier(&self) -> Option<u32> {
        match self {
            PerformanceMode::High => Some(1),
            PerformanceMode::Medium => Some(2),
            PerformanceMode::Low => Some(3),
            PerformanceMode::Emergency => None,
        }
    }

    /// Scale a requested delay for this mode.
    pub fn scale(&self, base: Duration) -> AnimationDelay {
        match self.delay_multiplier() {
            Some(factor) => AnimationDelay::Enabled(base.saturating_mul(factor)),
            None => AnimationDelay::Disabled,
        }
    }

    /// Derive the mode from a fresh sample report and the two hard signals.
    ///
    /// Memory pressure and an over-full registry dominate frame timings.
    pub fn evaluate(report: &PerformanceReport, memory_pressure: bool, over_ceiling: bool) -> Self {
        if memory_pressure || over_ceiling {
            PerformanceMode::Emergency
        } else if report.should_reduce_animations {
            PerformanceMode::Low
        } else if report.is_low_performance {
            PerformanceMode::Medium
        } else {
            PerformanceMode::High
        }
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PerformanceMode::High => "high",
            PerformanceMode::Medium => "medium",
            PerformanceMode::Low => "low",
            PerformanceMode::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

/// The answer to "how long should I wait before animating?".
///
/// `Disabled` is distinct from a short delay: the caller must not animate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationDelay {
    /// Animate after this delay
    Enabled(Duration),
    /// Do not animate
    Disabled,
}

impl AnimationDelay {
    /// Whether animation is disabled.
    pub fn is_disabled(&self) -> bool {
        matches!(self, AnimationDelay::Disabled)
    }

    /// The delay to wait; zero when disabled.
    pub fn as_duration(&self) -> Duration {
        match self {
            AnimationDelay::Enabled(delay) => *delay,
            AnimationDelay::Disabled => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(is_low: bool, should_reduce: bool) -> PerformanceReport {
        PerformanceReport {
            average: Duration::from_millis(16),
            max: Duration::from_millis(16),
            samples: 30,
            is_low_performance: is_low,
            should_reduce_animations: should_reduce,
        }
    }

    #[test]
    fn test_mode_ordering() {
        assert!(PerformanceMode::High < PerformanceMode::Medium);
        assert!(PerformanceMode::Medium < PerformanceMode::Low);
        assert!(PerformanceMode::Low < PerformanceMode::Emergency);
        assert_eq!(PerformanceMode::default(), PerformanceMode::High);
    }

    #[test]
    fn test_scale() {
        let base = Duration::from_millis(100);
        assert_eq!(PerformanceMode::High.scale(base), AnimationDelay::Enabled(base));
        assert_eq!(
            PerformanceMode::Medium.scale(base),
            AnimationDelay::Enabled(Duration::from_millis(200))
        );
        assert_eq!(
            PerformanceMode::Low.scale(base),
            AnimationDelay::Enabled(Duration::from_millis(300))
        );
        assert_eq!(PerformanceMode::Emergency.scale(base), AnimationDelay::Disabled);
    }

    #[test]
    fn test_disabled_delay_is_zero() {
        assert!(AnimationDelay::Disabled.is_disabled());
        assert_eq!(AnimationDelay::Disabled.as_duration(), Duration::ZERO);
        assert!(!AnimationDelay::Enabled(Duration::ZERO).is_disabled());
    }

    #[test]
    fn test_evaluate() {
        assert_eq!(PerformanceMode::evaluate(&report(false, false), false, false), PerformanceMode::High);
        assert_eq!(PerformanceMode::evaluate(&report(true, false), false, false), PerformanceMode::Medium);
        assert_eq!(PerformanceMode::evaluate(&report(true, true), false, false), PerformanceMode::Low);
        assert_eq!(PerformanceMode::evaluate(&report(false, false), true, false), PerformanceMode::Emergency);
        assert_eq!(PerformanceMode::evaluate(&report(false, false), false, true), PerformanceMode::Emergency);
    }

    #[test]
    fn test_display() {
        assert_eq!(PerformanceMode::Emergency.to_string(), "emergency");
        assert_eq!(PerformanceMode::High.to_string(), "high");
    }
}
