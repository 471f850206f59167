//! CLI entry point for acquisition flow control
//!
//! Provides:
//! - `worker`: a synthetic job worker process that attaches to a shared
//!   admission region and records job completions
//! - `stats`: a JSON snapshot of an existing admission region
//! - `simulate`: one timepoint end to end, with a child worker process,
//!   backpressure and an operator pause/retake
//!
//! # Usage
//!
//! ```bash
//! daq-flow simulate --pause-after 4
//! daq-flow --config config/daq-flow.toml simulate
//! daq-flow stats --state /dev/shm/daq-flow-admission-<id>.shm
//! ```
//!
//! Logs go to stderr; machine-readable output goes to stdout.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod simulate;
mod worker;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_backpressure::{BackpressureController, SharedAdmissionState};
use daq_core::observability::{self, LogFormat};
use daq_core::FlowConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "daq-flow")]
#[command(about = "Acquisition flow control: admission backpressure and timepoint pause/retake", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Environment variables prefixed
    /// DAQ_FLOW_ override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job worker attached to an admission region.
    ///
    /// Reads one job size in bytes per stdin line, spends the service time
    /// on it, then records its completion. Exits at end of input.
    Worker {
        /// Path of the admission region file
        #[arg(long)]
        state: PathBuf,

        /// Milliseconds spent per job (defaults to acquisition.worker_service_ms)
        #[arg(long)]
        service_ms: Option<u64>,
    },

    /// Print a JSON stats snapshot of an admission region
    Stats {
        /// Path of the admission region file
        #[arg(long)]
        state: PathBuf,

        /// Job limit used for the throttle flag
        #[arg(long)]
        max_jobs: Option<usize>,

        /// Memory limit in MB used for the throttle flag
        #[arg(long)]
        max_mb: Option<f64>,
    },

    /// Simulate one timepoint with a child job worker process
    Simulate {
        /// Request a pause after this many FOVs, then retake the first FOV
        /// and resume
        #[arg(long)]
        pause_after: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FlowConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FlowConfig::load().context("Failed to load config")?,
    };

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    observability::init_from_config(&config, format).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Worker { state, service_ms } => {
            let service =
                Duration::from_millis(service_ms.unwrap_or(config.acquisition.worker_service_ms));
            worker::run(&state, service)?;
        }
        Commands::Stats {
            state,
            max_jobs,
            max_mb,
        } => {
            let mut limits = config.backpressure.clone();
            if let Some(max_jobs) = max_jobs {
                limits.max_jobs = max_jobs;
            }
            if let Some(max_mb) = max_mb {
                limits.max_mb = max_mb;
            }
            limits.validate()?;

            let region = SharedAdmissionState::open(&state)
                .with_context(|| format!("Failed to open admission region {}", state.display()))?;
            let controller = BackpressureController::with_shared_state(limits, Arc::new(region));
            println!("{}", serde_json::to_string_pretty(&controller.stats())?);
        }
        Commands::Simulate { pause_after } => {
            let report = simulate::run(&config, cli.config.as_deref(), pause_after)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
