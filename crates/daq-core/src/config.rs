//! Flow-control configuration using Figment.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Library defaults ([`FlowConfig::default`])
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `DAQ_FLOW_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use daq_core::config::FlowConfig;
//!
//! // DAQ_FLOW_BACKPRESSURE__MAX_JOBS=20 overrides the file value
//! let config = FlowConfig::load_from("config/daq-flow.toml")?;
//! println!("max jobs in flight: {}", config.backpressure.max_jobs);
//! # Ok::<(), daq_core::error::FlowError>(())
//! ```
//!
//! ## Schema
//!
//! - **`log_level`**: tracing verbosity ("trace" .. "error").
//! - **`[backpressure]`**: admission limits (`enabled`, `max_jobs`, `max_mb`, `timeout_s`).
//! - **`[acquisition]`**: parameters for the simulated acquisition run by the CLI.

use crate::error::{FlowError, FlowResult};
use crate::limits::mb_to_bytes;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "DAQ_FLOW_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level flow-control configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Logging verbosity level.
    ///
    /// Valid values: "error", "warn", "info", "debug", "trace".
    /// Default: "info".
    pub log_level: String,

    /// Admission limits for the backpressure controller.
    pub backpressure: BackpressureConfig,

    /// Simulated acquisition parameters (CLI only).
    pub acquisition: AcquisitionConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            backpressure: BackpressureConfig::default(),
            acquisition: AcquisitionConfig::default(),
        }
    }
}

impl Provider for FlowConfig {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("Library Defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}

/// Admission limits consumed by `BackpressureController`.
///
/// # Defaults
///
/// - `enabled`: true
/// - `max_jobs`: 10
/// - `max_mb`: 500.0
/// - `timeout_s`: 30.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureConfig {
    /// When false the controller never throttles and ignores dispatch accounting.
    pub enabled: bool,

    /// Throttle once this many jobs are in flight.
    pub max_jobs: usize,

    /// Throttle once this many megabytes (MiB) are in flight.
    pub max_mb: f64,

    /// Soft deadline for a single `wait_for_capacity` call, in seconds.
    ///
    /// Expiry is logged and reported; acquisition proceeds regardless.
    pub timeout_s: f64,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_jobs: 10,
            max_mb: 500.0,
            timeout_s: 30.0,
        }
    }
}

impl BackpressureConfig {
    /// Limits with the default timeout.
    #[must_use]
    pub fn new(max_jobs: usize, max_mb: f64) -> Self {
        Self {
            max_jobs,
            max_mb,
            ..Self::default()
        }
    }

    /// Set the soft wait deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_s = timeout.as_secs_f64();
        self
    }

    /// Enable or disable throttling.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Byte limit derived from `max_mb`.
    #[must_use]
    pub fn max_bytes(&self) -> i64 {
        mb_to_bytes(self.max_mb)
    }

    /// Wait deadline as a `Duration`. Invalid values collapse to zero.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_s).unwrap_or(Duration::ZERO)
    }

    /// Check limits are usable.
    pub fn validate(&self) -> FlowResult<()> {
        if self.max_jobs == 0 {
            return Err(FlowError::Configuration(
                "backpressure.max_jobs must be at least 1".into(),
            ));
        }
        if !self.max_mb.is_finite() || self.max_mb <= 0.0 {
            return Err(FlowError::Configuration(format!(
                "backpressure.max_mb must be a positive number, got {}",
                self.max_mb
            )));
        }
        if !self.timeout_s.is_finite() || self.timeout_s < 0.0 {
            return Err(FlowError::Configuration(format!(
                "backpressure.timeout_s must be a non-negative number, got {}",
                self.timeout_s
            )));
        }
        Ok(())
    }
}

/// Parameters for the simulated timepoint run by `daq-flow simulate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// FOVs captured per timepoint.
    pub total_fovs: usize,
    /// Bytes per captured frame (2048 x 2048 x 16-bit by default).
    pub frame_bytes: u64,
    /// Time the synthetic job worker spends on each frame, in milliseconds.
    pub worker_service_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            total_fovs: 16,
            frame_bytes: 2048 * 2048 * 2,
            worker_service_ms: 50,
        }
    }
}

impl FlowConfig {
    /// Load defaults overridden by environment variables only.
    pub fn load() -> FlowResult<Self> {
        Self::extract(Self::figment())
    }

    /// Load defaults, then `path`, then environment variables.
    ///
    /// A missing file is not an error; Figment simply contributes nothing.
    pub fn load_from<P: AsRef<Path>>(path: P) -> FlowResult<Self> {
        let figment = Figment::from(FlowConfig::default())
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Base figment: defaults plus environment.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::from(FlowConfig::default()).merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> FlowResult<Self> {
        let config: FlowConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections.
    pub fn validate(&self) -> FlowResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(FlowError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }
        self.backpressure.validate()?;
        if self.acquisition.total_fovs == 0 {
            return Err(FlowError::Configuration(
                "acquisition.total_fovs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
