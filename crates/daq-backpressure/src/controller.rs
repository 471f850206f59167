//! Admission control for in-flight image-processing work.
//!
//! [`BackpressureController`] reads the [`SharedAdmissionState`] that a job
//! worker process updates, and tells the acquisition side when to hold off.
//! Admission is advisory: a wait that exceeds its deadline is logged and
//! reported, and the caller proceeds anyway.
//!
//! # Wait loop
//!
//! ```text
//!   throttled? ──no──▶ Granted
//!      │yes
//!      ▼
//!   ┌▶ closed? ──yes──▶ Cancelled
//!   │  throttled? ──no──▶ Granted
//!   │  past deadline? ──yes──▶ TimedOut
//!   │  clear signal
//!   │  still throttled? ──yes──▶ wait(signal, ≤100ms)
//!   └──────────┘
//! ```
//!
//! Re-checking after the clear is what prevents a lost wakeup from turning
//! into a block: if capacity freed in between, the check fails and the loop
//! exits without waiting.

use crate::shared::SharedAdmissionState;
use daq_core::config::BackpressureConfig;
use daq_core::error::{FlowError, FlowResult};
use daq_core::limits::{bytes_to_mb, CAPACITY_POLL_INTERVAL};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of [`BackpressureController::wait_for_capacity`].
///
/// Every variant lets the caller proceed; they differ in *why*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityWait {
    /// Limits were not (or no longer) exceeded.
    Granted,
    /// The soft deadline passed while still throttled.
    TimedOut,
    /// The controller was closed; shutdown takes priority over backpressure.
    Cancelled,
}

impl CapacityWait {
    /// Admission is advisory, so the caller always proceeds.
    #[must_use]
    pub fn proceed(self) -> bool {
        true
    }

    /// Boolean form: `false` only for a timeout.
    #[must_use]
    pub fn granted(self) -> bool {
        !matches!(self, CapacityWait::TimedOut)
    }
}

impl std::fmt::Display for CapacityWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityWait::Granted => write!(f, "granted"),
            CapacityWait::TimedOut => write!(f, "timed out"),
            CapacityWait::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Point-in-time backpressure statistics for monitoring.
///
/// Both counters are read under both locks, so they describe the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackpressureStats {
    /// Jobs in flight.
    pub pending_jobs: i64,
    /// Megabytes (MiB) in flight.
    pub pending_bytes_mb: f64,
    /// Configured job limit.
    pub max_pending_jobs: usize,
    /// Configured byte limit in MiB.
    pub max_pending_mb: f64,
    /// Whether either limit is currently reached.
    pub is_throttled: bool,
}

/// Throttles job submission across the controlling and job-worker processes.
///
/// # Thread Safety
///
/// Every method takes `&self` and is safe to call from any thread, including
/// [`close`](Self::close) concurrently with a blocked
/// [`wait_for_capacity`](Self::wait_for_capacity).
///
/// # Example
///
/// ```no_run
/// use daq_backpressure::{BackpressureController, SharedAdmissionState};
/// use daq_core::config::BackpressureConfig;
/// use std::sync::Arc;
///
/// # fn main() -> daq_core::error::FlowResult<()> {
/// // Pre-warm: create the region first and hand its path to the worker process
/// let shared = Arc::new(SharedAdmissionState::create()?);
/// let controller = BackpressureController::with_shared_state(BackpressureConfig::default(), shared);
///
/// if !controller.wait_for_capacity().granted() {
///     tracing::warn!("still over limits, acquiring anyway");
/// }
/// controller.job_dispatched(8 * 1024 * 1024);
/// controller.close();
/// # Ok(())
/// # }
/// ```
pub struct BackpressureController {
    config: BackpressureConfig,
    max_jobs: i64,
    max_bytes: i64,
    timeout: Duration,
    /// `None` once closed.
    shared: RwLock<Option<Arc<SharedAdmissionState>>>,
    closed: AtomicBool,
}

impl BackpressureController {
    /// Create a controller that owns a newly created, file-backed region.
    pub fn new(config: BackpressureConfig) -> FlowResult<Self> {
        let shared = Arc::new(SharedAdmissionState::create()?);
        Ok(Self::with_shared_state(config, shared))
    }

    /// Create a controller over an existing region.
    ///
    /// Used when a job worker was started (and attached to the region)
    /// before the controller existed.
    #[must_use]
    pub fn with_shared_state(config: BackpressureConfig, shared: Arc<SharedAdmissionState>) -> Self {
        Self {
            max_jobs: i64::try_from(config.max_jobs).unwrap_or(i64::MAX),
            max_bytes: config.max_bytes(),
            timeout: config.timeout(),
            config,
            shared: RwLock::new(Some(shared)),
            closed: AtomicBool::new(false),
        }
    }

    /// Configured limits.
    #[must_use]
    pub fn config(&self) -> &BackpressureConfig {
        &self.config
    }

    /// Whether throttling is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// True once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Handle to the shared region, for passing to a job worker. `None` after close.
    #[must_use]
    pub fn shared_state(&self) -> Option<Arc<SharedAdmissionState>> {
        self.shared.read().clone()
    }

    /// Backing file of the shared region, if it has one.
    #[must_use]
    pub fn state_path(&self) -> Option<PathBuf> {
        self.shared_state()
            .and_then(|shared| shared.path().map(PathBuf::from))
    }

    /// Jobs in flight (0 after close).
    #[must_use]
    pub fn pending_jobs(&self) -> i64 {
        self.shared_state().map_or(0, |shared| shared.pending_jobs())
    }

    /// Megabytes in flight (0.0 after close).
    #[must_use]
    pub fn pending_mb(&self) -> f64 {
        self.shared_state()
            .map_or(0.0, |shared| bytes_to_mb(shared.pending_bytes()))
    }

    fn warn_if_closed(&self, method: &str) -> bool {
        if self.is_closed() {
            warn!(method, "BackpressureController used after close()");
            return true;
        }
        false
    }

    /// Each counter is read under its own lock; slight staleness between the
    /// two readings is acceptable for a throttle decision.
    fn over_limits(&self, shared: &SharedAdmissionState) -> bool {
        let jobs_over = shared.pending_jobs() >= self.max_jobs;
        let bytes_over = shared.pending_bytes() >= self.max_bytes;
        jobs_over || bytes_over
    }

    /// True if either limit is reached. Always false when disabled or closed.
    #[must_use]
    pub fn should_throttle(&self) -> bool {
        if !self.config.enabled || self.is_closed() {
            return false;
        }
        match self.shared_state() {
            Some(shared) => self.over_limits(&shared),
            None => false,
        }
    }

    /// Block until capacity frees, the soft deadline passes, or the
    /// controller closes.
    ///
    /// Returns immediately with [`CapacityWait::Granted`] when not throttled.
    pub fn wait_for_capacity(&self) -> CapacityWait {
        if self.warn_if_closed("wait_for_capacity") {
            return CapacityWait::Cancelled;
        }
        if !self.should_throttle() {
            return CapacityWait::Granted;
        }

        info!(
            pending_jobs = self.pending_jobs(),
            max_jobs = self.config.max_jobs,
            pending_mb = format!("{:.1}", self.pending_mb()),
            max_mb = format!("{:.1}", bytes_to_mb(self.max_bytes)),
            "Backpressure throttling"
        );

        let started = Instant::now();
        let deadline = started + self.timeout;
        loop {
            // Hold our own handle for this pass so close() cannot tear it down mid-check
            let Some(shared) = self.shared_state() else {
                return CapacityWait::Cancelled;
            };
            if self.is_closed() {
                debug!("Backpressure wait cancelled by close()");
                return CapacityWait::Cancelled;
            }
            if !self.over_limits(&shared) {
                debug!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Backpressure released"
                );
                return CapacityWait::Granted;
            }
            if Instant::now() >= deadline {
                warn!(
                    timeout_s = self.config.timeout_s,
                    pending_jobs = shared.pending_jobs(),
                    "Backpressure timeout, continuing"
                );
                return CapacityWait::TimedOut;
            }

            let signal = shared.capacity_signal();
            signal.clear();
            // close() raises the flag only after marking closed, so a set we just
            // cleared is still visible here
            if self.is_closed() {
                return CapacityWait::Cancelled;
            }
            if self.over_limits(&shared) {
                signal.wait(CAPACITY_POLL_INTERVAL);
            }
        }
    }

    /// Account for a newly admitted job. No-op when disabled or closed.
    ///
    /// A job worker normally does this itself through
    /// [`SharedAdmissionState::record_dispatch`].
    pub fn job_dispatched(&self, bytes: u64) {
        if !self.config.enabled || self.is_closed() {
            return;
        }
        if let Some(shared) = self.shared_state() {
            shared.record_dispatch(bytes);
        }
    }

    /// Consistent snapshot of both counters and the limits.
    ///
    /// Counters read as zero once closed.
    #[must_use]
    pub fn stats(&self) -> BackpressureStats {
        let max_pending_mb = bytes_to_mb(self.max_bytes);
        let shared = match self.shared_state() {
            Some(shared) if !self.is_closed() => shared,
            _ => {
                return BackpressureStats {
                    pending_jobs: 0,
                    pending_bytes_mb: 0.0,
                    max_pending_jobs: self.config.max_jobs,
                    max_pending_mb,
                    is_throttled: false,
                }
            }
        };

        let snapshot = shared.snapshot();
        let jobs_over = snapshot.pending_jobs >= self.max_jobs;
        let bytes_over = snapshot.pending_bytes >= self.max_bytes;
        BackpressureStats {
            pending_jobs: snapshot.pending_jobs,
            pending_bytes_mb: bytes_to_mb(snapshot.pending_bytes),
            max_pending_jobs: self.config.max_jobs,
            max_pending_mb,
            is_throttled: self.config.enabled && (jobs_over || bytes_over),
        }
    }

    /// Zero both counters. Call at acquisition start, with nothing in flight.
    ///
    /// With jobs still pending the counters are zeroed anyway, a warning is
    /// logged, and [`FlowError::ResetWithPendingJobs`] is returned: those jobs
    /// will later drive the counters negative and weaken throttling.
    /// A no-op (with a warning) after close.
    pub fn reset(&self) -> FlowResult<()> {
        if self.warn_if_closed("reset") {
            return Ok(());
        }
        let Some(shared) = self.shared_state() else {
            return Ok(());
        };

        let previous = shared.reset_counters();
        if previous.pending_jobs > 0 {
            warn!(
                pending_jobs = previous.pending_jobs,
                pending_bytes = previous.pending_bytes,
                "Backpressure reset() called with jobs pending. This may cause counter underflow."
            );
            return Err(FlowError::ResetWithPendingJobs {
                pending_jobs: previous.pending_jobs,
                pending_bytes: previous.pending_bytes,
            });
        }
        Ok(())
    }

    /// Release the shared region and wake any blocked waiter.
    ///
    /// Idempotent and callable from any thread. The wake happens before the
    /// handle is dropped, so a woken waiter never observes a half-closed
    /// controller.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let shared = self.shared.read().clone();
        if let Some(shared) = &shared {
            shared.capacity_signal().set();
        }
        self.shared.write().take();
        debug!("Backpressure controller closed");
    }
}

impl Drop for BackpressureController {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BackpressureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureController")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}
