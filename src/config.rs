//! Configuration management for Marquee.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::error::{MarqueeError, Result};
use crate::ratelimit::RateLimitPolicy;

/// Main configuration for the Marquee service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarqueeConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Animation lifecycle configuration
    #[serde(default)]
    pub animation: AnimationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// How often the host sweeps expired counters, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Policy for the contact form endpoint
    #[serde(default = "default_contact_policy")]
    pub contact: PolicyConfig,

    /// Policy for the quote form endpoint
    #[serde(default = "default_quote_policy")]
    pub quote: PolicyConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            contact: default_contact_policy(),
            quote: default_quote_policy(),
        }
    }
}

impl RateLimitingConfig {
    /// Sweep cadence as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_contact_policy() -> PolicyConfig {
    PolicyConfig {
        max_requests: 5,
        window_ms: 60_000,
    }
}

fn default_quote_policy() -> PolicyConfig {
    PolicyConfig {
        max_requests: 3,
        window_ms: 300_000,
    }
}

/// Raw, unvalidated policy values as they appear in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl TryFrom<PolicyConfig> for RateLimitPolicy {
    type Error = MarqueeError;

    fn try_from(config: PolicyConfig) -> Result<Self> {
        RateLimitPolicy::new(config.max_requests, Duration::from_millis(config.window_ms))
    }
}

/// Animation lifecycle and performance thresholds.
///
/// The frame-time thresholds are policy, biased toward not degrading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Live registrations above this count force emergency mode
    #[serde(default = "default_max_components")]
    pub max_components: usize,

    /// Size of the frame-time ring
    #[serde(default = "default_sample_capacity")]
    pub sample_capacity: usize,

    /// Samples required before the ring is evaluated
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Average frame time (ms) above which performance is considered low
    #[serde(default = "default_low_avg_ms")]
    pub low_avg_ms: f64,

    /// Worst frame time (ms) above which performance is considered low
    #[serde(default = "default_low_max_ms")]
    pub low_max_ms: f64,

    /// Average frame time (ms) above which animations should be reduced
    #[serde(default = "default_reduce_avg_ms")]
    pub reduce_avg_ms: f64,

    /// Worst frame time (ms) above which animations should be reduced
    #[serde(default = "default_reduce_max_ms")]
    pub reduce_max_ms: f64,

    /// Heap used/limit ratio treated as memory pressure
    #[serde(default = "default_memory_pressure_ratio")]
    pub memory_pressure_ratio: f64,

    /// Platform reduced-motion preference
    #[serde(default)]
    pub prefers_reduced_motion: bool,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            max_components: default_max_components(),
            sample_capacity: default_sample_capacity(),
            min_samples: default_min_samples(),
            low_avg_ms: default_low_avg_ms(),
            low_max_ms: default_low_max_ms(),
            reduce_avg_ms: default_reduce_avg_ms(),
            reduce_max_ms: default_reduce_max_ms(),
            memory_pressure_ratio: default_memory_pressure_ratio(),
            prefers_reduced_motion: false,
        }
    }
}

fn default_max_components() -> usize {
    10
}

fn default_sample_capacity() -> usize {
    60
}

fn default_min_samples() -> usize {
    30
}

fn default_low_avg_ms() -> f64 {
    18.0
}

fn default_low_max_ms() -> f64 {
    40.0
}

fn default_reduce_avg_ms() -> f64 {
    22.0
}

fn default_reduce_max_ms() -> f64 {
    80.0
}

fn default_memory_pressure_ratio() -> f64 {
    0.9
}

impl MarqueeConfig {
    /// Load configuration from an optional YAML file, overlaid with
    /// `MARQUEE__*` environment variables (e.g. `MARQUEE__SERVER__HTTP_ADDR`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("MARQUEE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| MarqueeError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Validate the configured policies, returning them in (contact, quote) order.
    pub fn policies(&self) -> Result<(RateLimitPolicy, RateLimitPolicy)> {
        let contact = RateLimitPolicy::try_from(self.rate_limiting.contact)?;
        let quote = RateLimitPolicy::try_from(self.rate_limiting.quote)?;
        Ok((contact, quote))
    }
}
