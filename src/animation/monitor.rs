//! Rolling frame-time sampling.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::AnimationConfig;

/// Frame-time limits that mark performance as low or animations as too costly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameThresholds {
    pub low_average: Duration,
    pub low_max: Duration,
    pub reduce_average: Duration,
    pub reduce_max: Duration,
}

impl FrameThresholds {
    /// Build thresholds from millisecond values in configuration.
    pub fn from_config(config: &AnimationConfig) -> Self {
        Self {
            low_average: millis(config.low_avg_ms),
            low_max: millis(config.low_max_ms),
            reduce_average: millis(config.reduce_avg_ms),
            reduce_max: millis(config.reduce_max_ms),
        }
    }
}

impl Default for FrameThresholds {
    fn default() -> Self {
        Self::from_config(&AnimationConfig::default())
    }
}

fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

/// Rolling statistics over the sample ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceReport {
    /// Mean frame time across the ring
    pub average: Duration,
    /// Worst frame time in the ring
    pub max: Duration,
    /// Number of samples the report was derived from
    pub samples: usize,
    pub is_low_performance: bool,
    pub should_reduce_animations: bool,
}

/// A bounded, most-recent-N ring of frame times.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    samples: VecDeque<Duration>,
    capacity: usize,
    min_samples: usize,
    thresholds: FrameThresholds,
    last_frame: Option<Instant>,
    latest: Option<PerformanceReport>,
}

impl PerformanceMonitor {
    /// Create a monitor keeping `capacity` samples and reporting once
    /// `min_samples` are present.
    pub fn new(capacity: usize, min_samples: usize, thresholds: FrameThresholds) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            min_samples: min_samples.clamp(1, capacity),
            thresholds,
            last_frame: None,
            latest: None,
        }
    }

    /// Create a monitor from animation configuration.
    pub fn from_config(config: &AnimationConfig) -> Self {
        Self::new(
            config.sample_capacity,
            config.min_samples,
            FrameThresholds::from_config(config),
        )
    }

    /// Record a frame timestamp. The first frame only anchors the clock;
    /// later frames contribute the time since the previous one.
    pub fn record_frame(&mut self, now: Instant) -> Option<PerformanceReport> {
        let last = self.last_frame.replace(now)?;
        self.push(now.saturating_duration_since(last))
    }

    /// Append one frame time, evicting the oldest sample when full.
    pub fn push(&mut self, frame_time: Duration) -> Option<PerformanceReport> {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(frame_time);

        if self.samples.len() < self.min_samples {
            return None;
        }

        let total: Duration = self.samples.iter().sum();
        let average = total / self.samples.len() as u32;
        let max = self.samples.iter().copied().max().unwrap_or_default();

        let report = PerformanceReport {
            average,
            max,
            samples: self.samples.len(),
            is_low_performance: average > self.thresholds.low_average
                || max > self.thresholds.low_max,
            should_reduce_animations: average > self.thresholds.reduce_average
                || max > self.thresholds.reduce_max,
        };
        self.latest = Some(report);
        Some(report)
    }

    /// The most recent report, if enough samples have been seen.
    pub fn latest(&self) -> Option<PerformanceReport> {
        self.latest
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Forget all samples and the frame anchor.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_frame = None;
        self.latest = None;
    }
}
