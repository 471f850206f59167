//! Synthetic job worker process.

use anyhow::{Context, Result};
use daq_backpressure::SharedAdmissionState;
use std::io::{self, BufRead};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Attach to the region at `state` and complete one job per stdin line.
///
/// Returns the number of jobs completed once stdin is closed.
pub fn run(state: &Path, service: Duration) -> Result<usize> {
    let region = SharedAdmissionState::open(state)
        .with_context(|| format!("Failed to attach to admission region {}", state.display()))?;
    info!(
        path = %state.display(),
        service_ms = service.as_millis() as u64,
        "Job worker attached"
    );

    let mut completed = 0;
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read job from stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bytes: u64 = line
            .parse()
            .with_context(|| format!("Invalid job size '{line}'"))?;

        thread::sleep(service);
        region.record_completion(bytes);
        completed += 1;
        debug!(bytes, completed, "Job completed");
    }

    info!(completed, "Job worker input closed, exiting");
    Ok(completed)
}
