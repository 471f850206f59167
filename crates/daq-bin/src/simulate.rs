//! One simulated timepoint: acquisition loop, operator and job worker process.
//!
//! The main thread plays the acquisition worker. It asks the controller for
//! capacity before each frame, hands the frame to a child `daq-flow worker`
//! over its stdin and honours pause requests between FOVs. An operator thread
//! optionally pauses after a number of FOVs, retakes the first FOV and
//! resumes.

use anyhow::{bail, Context, Result};
use daq_backpressure::{
    BackpressureController, BackpressureStats, CapacityWait, SharedAdmissionState,
};
use daq_core::FlowConfig;
use daq_experiment::{FovIdentifier, TimepointState, TimepointStateMachine};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::process::{ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const REGION: &str = "A1";

/// Longest the acquisition loop waits for the operator while paused.
const OPERATOR_TIMEOUT: Duration = Duration::from_secs(30);

const OPERATOR_POLL: Duration = Duration::from_millis(5);

/// Summary printed by `daq-flow simulate`.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub fovs_captured: usize,
    pub retakes: usize,
    pub capacity_waits: usize,
    pub capacity_timeouts: usize,
    pub final_state: TimepointState,
    pub stats: BackpressureStats,
}

/// Frame submission through the controller to the child worker.
///
/// Admission is counted on the region itself, whether or not throttling is
/// enabled, so every completion the worker records has a matching dispatch.
struct JobSink<'a> {
    controller: &'a BackpressureController,
    region: Arc<SharedAdmissionState>,
    stdin: ChildStdin,
    frame_bytes: u64,
    capacity_waits: usize,
    capacity_timeouts: usize,
}

impl JobSink<'_> {
    fn submit(&mut self, fov: &FovIdentifier) -> Result<()> {
        if self.controller.should_throttle() {
            self.capacity_waits += 1;
        }
        match self.controller.wait_for_capacity() {
            CapacityWait::Granted => {}
            CapacityWait::TimedOut => {
                self.capacity_timeouts += 1;
                warn!(%fov, "Submitting frame over backpressure limits");
            }
            CapacityWait::Cancelled => bail!("Backpressure controller closed during acquisition"),
        }

        self.region.record_dispatch(self.frame_bytes);
        writeln!(self.stdin, "{}", self.frame_bytes)
            .with_context(|| format!("Failed to hand {fov} to the job worker"))?;
        Ok(())
    }
}

/// Run one timepoint and report what happened.
pub fn run(
    config: &FlowConfig,
    config_path: Option<&Path>,
    pause_after: Option<usize>,
) -> Result<SimulationReport> {
    let acquisition = &config.acquisition;
    let controller = BackpressureController::new(config.backpressure.clone())?;
    let region = controller
        .shared_state()
        .context("Backpressure controller has no admission region")?;
    let state_path = region
        .path()
        .map(Path::to_path_buf)
        .context("Admission region has no backing file")?;

    let mut worker_cmd = Command::new(std::env::current_exe()?);
    if let Some(path) = config_path {
        worker_cmd.arg("--config").arg(path);
    }
    let mut child = worker_cmd
        .arg("worker")
        .arg("--state")
        .arg(&state_path)
        .arg("--service-ms")
        .arg(acquisition.worker_service_ms.to_string())
        .stdin(Stdio::piped())
        .spawn()
        .context("Failed to spawn job worker")?;
    let stdin = child.stdin.take().context("Job worker has no stdin")?;
    info!(pid = child.id(), path = %state_path.display(), "Job worker started");

    let sm = Arc::new(TimepointStateMachine::new());
    sm.reset(acquisition.total_fovs);

    let (state_tx, state_rx) = mpsc::channel();
    sm.set_state_observer(move |state| {
        info!(%state, "Timepoint state changed");
        let _ = state_tx.send(state);
    })?;

    let operator = match pause_after {
        Some(after) => Some(spawn_operator(
            Arc::clone(&sm),
            state_rx,
            acquisition.total_fovs,
            after,
        )?),
        None => None,
    };

    let mut sink = JobSink {
        controller: &controller,
        region,
        stdin,
        frame_bytes: acquisition.frame_bytes,
        capacity_waits: 0,
        capacity_timeouts: 0,
    };

    let mut next = 0;
    let mut retakes = 0;
    while next < acquisition.total_fovs {
        if sm.is_pause_requested() {
            if sm.complete_pause() {
                retakes += serve_pause(&sm, &mut sink)?;
            }
            continue;
        }
        let fov = FovIdentifier::new(REGION, next);
        sink.submit(&fov)?;
        sm.mark_fov_captured();
        next += 1;
    }
    if !sm.mark_all_captured() {
        info!(state = %sm.state(), "Timepoint already complete");
    }

    // Ends the operator thread if it is still waiting for a transition
    sm.clear_state_observer();
    if let Some(operator) = operator {
        if operator.join().is_err() {
            warn!("Operator thread panicked");
        }
    }

    let JobSink {
        stdin,
        capacity_waits,
        capacity_timeouts,
        ..
    } = sink;
    drop(stdin);
    let status = child.wait().context("Failed to wait for job worker")?;
    if !status.success() {
        bail!("Job worker exited with {status}");
    }

    let report = SimulationReport {
        fovs_captured: next,
        retakes,
        capacity_waits,
        capacity_timeouts,
        final_state: sm.state(),
        stats: controller.stats(),
    };
    controller.close();
    info!(
        fovs = report.fovs_captured,
        retakes = report.retakes,
        timeouts = report.capacity_timeouts,
        "Timepoint simulation finished"
    );
    Ok(report)
}

/// Stay paused until the operator resumes, performing any retakes asked for.
///
/// Returns the number of FOVs retaken.
fn serve_pause(sm: &TimepointStateMachine, sink: &mut JobSink<'_>) -> Result<usize> {
    let mut retaken = 0;
    loop {
        if !sm.wait_for_resume(Some(OPERATOR_TIMEOUT)) {
            bail!("No operator decision within {OPERATOR_TIMEOUT:?}");
        }
        if sm.state() != TimepointState::Retaking {
            return Ok(retaken);
        }
        for fov in sm.retake_list() {
            sink.submit(&fov)?;
            retaken += 1;
        }
        sm.complete_retakes();
    }
}

/// Pause after `after` FOVs, retake the first FOV once, then resume.
fn spawn_operator(
    sm: Arc<TimepointStateMachine>,
    states: mpsc::Receiver<TimepointState>,
    total_fovs: usize,
    after: usize,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("operator".into())
        .spawn(move || {
            while total_fovs.saturating_sub(sm.fovs_remaining()) < after
                && sm.state() == TimepointState::Acquiring
            {
                thread::sleep(OPERATOR_POLL);
            }
            if !sm.request_pause() {
                return;
            }

            let mut retake_done = false;
            while let Ok(state) = states.recv() {
                if state != TimepointState::Paused {
                    continue;
                }
                if !retake_done && sm.retake(&[FovIdentifier::new(REGION, 0)]) {
                    retake_done = true;
                    continue;
                }
                sm.resume();
                break;
            }
        })?;
    Ok(handle)
}
