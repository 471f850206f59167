//! Tracing initialisation for `daq-flow` processes.
//!
//! Libraries in this workspace only emit `tracing` events. The acquisition
//! process and the job workers it spawns all write to the same stderr, so
//! lines carry thread names and colour is used only when stderr is a
//! terminal. `RUST_LOG` takes precedence over the configured level when set.
//!
//! # Example
//! ```no_run
//! use daq_core::{config::FlowConfig, observability::{self, LogFormat}};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FlowConfig::load()?;
//! observability::init_from_config(&config, LogFormat::Compact)?;
//! tracing::info!("flow control ready");
//! # Ok(())
//! # }
//! ```

use crate::config::FlowConfig;
use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// How log lines are written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One human-readable line per event
    #[default]
    Compact,
    /// One JSON object per event, for log collectors
    Json,
}

/// Install the global subscriber for this process.
///
/// Returns `Ok(())` without changes when a subscriber is already installed,
/// so tests and workers spawned in-process can call it freely.
pub fn init_from_config(config: &FlowConfig, format: LogFormat) -> Result<(), String> {
    let level = parse_log_level(&config.log_level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let layer = match format {
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_thread_names(true)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .or_else(|e| {
            if tracing::dispatcher::has_been_set() {
                Ok(())
            } else {
                Err(format!("Failed to initialize tracing: {e}"))
            }
        })
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        )),
    }
}
