//! Timepoint state machine: pause, review and FOV retake for one pass of
//! acquisition.
//!
//! Shared by a UI-control thread (pause/resume/retake/abort) and the
//! acquisition worker thread (progress reporting and pause hand-off). Every
//! read and transition is serialized by one internal mutex, so two threads
//! racing on conflicting transitions see exactly one succeed.
//!
//! # State Machine
//!
//! ```text
//!                 mark_all_captured()
//! ┌───────────┐───────────────────────────▶┌──────────┐
//! │ Acquiring │                            │ Captured │
//! └───────────┘◀──┐                   ┌───▶└──────────┘
//!       │         │ resume()          │ resume()  │
//!       │         │ (fovs left)       │ (none)    │
//!       │ request_pause()  ┌────────┐ │           │ request_pause()
//!       │ + complete_pause │ Paused │─┘           │ + complete_pause
//!       └─────────────────▶│        │◀────────────┘
//!                          └────────┘
//!                      retake() │ ▲ complete_retakes() / abort()
//!                               ▼ │
//!                          ┌──────────┐
//!                          │ Retaking │
//!                          └──────────┘
//! ```
//!
//! Pause is two-phase. [`TimepointStateMachine::request_pause`] only raises a
//! flag; the worker sees it through
//! [`TimepointStateMachine::is_pause_requested`] and calls
//! [`TimepointStateMachine::complete_pause`] once the FOV in flight is done,
//! so a pause never leaves a partial capture behind.
//!
//! Calls that are not legal in the current state return `false` and change
//! nothing.
//!
//! # Usage
//!
//! ```rust
//! use daq_experiment::{FovIdentifier, TimepointState, TimepointStateMachine};
//!
//! let sm = TimepointStateMachine::new();
//! sm.reset(4);
//!
//! assert!(sm.request_pause());
//! // worker finishes its current FOV first
//! sm.mark_fov_captured();
//! assert!(sm.complete_pause());
//! assert_eq!(sm.state(), TimepointState::Paused);
//!
//! assert!(sm.retake(&[FovIdentifier::new("A1", 0)]));
//! assert_eq!(sm.retake_list().len(), 1);
//! assert!(sm.complete_retakes());
//!
//! assert!(sm.resume());
//! assert_eq!(sm.state(), TimepointState::Acquiring);
//! ```

use crate::fov::FovIdentifier;
use crate::notifier::StateNotifier;
use daq_core::FlowResult;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Lifecycle of a single timepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimepointState {
    /// Worker is capturing FOVs
    Acquiring,
    /// Worker is idle, operator is reviewing
    Paused,
    /// Worker is re-acquiring the FOVs in the retake list
    Retaking,
    /// Every FOV of the timepoint has been captured
    Captured,
}

impl std::fmt::Display for TimepointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimepointState::Acquiring => write!(f, "acquiring"),
            TimepointState::Paused => write!(f, "paused"),
            TimepointState::Retaking => write!(f, "retaking"),
            TimepointState::Captured => write!(f, "captured"),
        }
    }
}

/// What [`TimepointStateMachine::abort`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortOutcome {
    /// Only the retake was cancelled; the machine is back in `Paused` and the
    /// acquisition carries on.
    RetakeCancelled,
    /// The caller must unwind the whole acquisition. The machine's state was
    /// not changed.
    AbortAcquisition,
}

impl AbortOutcome {
    /// Abort requests are always handled.
    #[must_use]
    pub fn accepted(self) -> bool {
        true
    }

    /// Whether the entire acquisition should stop.
    #[must_use]
    pub fn aborts_acquisition(self) -> bool {
        matches!(self, AbortOutcome::AbortAcquisition)
    }

    /// `(accepted, abort_entire_acquisition)`
    #[must_use]
    pub fn as_tuple(self) -> (bool, bool) {
        (self.accepted(), self.aborts_acquisition())
    }
}

/// Consistent view of the machine for UI polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimepointSnapshot {
    /// Current state
    pub state: TimepointState,
    /// FOVs not yet captured in this timepoint
    pub fovs_remaining: usize,
    /// A pause has been requested but not yet completed
    pub pause_requested: bool,
    /// Length of the retake worklist
    pub retake_count: usize,
}

struct Inner {
    state: TimepointState,
    fovs_remaining: usize,
    retake_list: Vec<FovIdentifier>,
    notifier: Option<StateNotifier>,
}

impl Inner {
    /// Move to `to`, notifying the observer only when the state changes.
    fn transition(&mut self, to: TimepointState) {
        let from = std::mem::replace(&mut self.state, to);
        if from != to {
            debug!(%from, %to, "Timepoint state transition");
            if let Some(notifier) = &self.notifier {
                notifier.notify(to);
            }
        }
    }
}

/// Single-shot wake signal. A waiter consumes it on return.
struct ResumeSignal {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl ResumeSignal {
    fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn set(&self) {
        *self.ready.lock() = true;
        self.cv.notify_all();
    }

    fn clear(&self) {
        *self.ready.lock() = false;
    }

    /// Wait for the signal, then clear it whether or not it arrived.
    fn wait_and_clear(&self, timeout: Option<Duration>) -> bool {
        let mut ready = self.ready.lock();
        match timeout {
            None => {
                while !*ready {
                    self.cv.wait(&mut ready);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*ready {
                    if self.cv.wait_until(&mut ready, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        std::mem::replace(&mut *ready, false)
    }
}

/// Thread-safe state machine for one timepoint of acquisition.
///
/// Created once per session and [`reset`](Self::reset) at the start of every
/// timepoint. Callers only ever receive copies or booleans, never references
/// into the machine's state.
pub struct TimepointStateMachine {
    inner: Mutex<Inner>,
    /// Written only while `inner` is held; read lock-free by the worker.
    pause_requested: AtomicBool,
    resume_signal: ResumeSignal,
}

impl Default for TimepointStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TimepointStateMachine {
    /// New machine in `Acquiring` with zero FOVs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: TimepointState::Acquiring,
                fovs_remaining: 0,
                retake_list: Vec::new(),
                notifier: None,
            }),
            pause_requested: AtomicBool::new(false),
            resume_signal: ResumeSignal::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TimepointState {
        self.inner.lock().state
    }

    /// Re-initialize for a new timepoint of `total_fovs` FOVs.
    ///
    /// Clears the retake list, the pause flag and the resume signal. The
    /// caller must make sure no worker is mid-transition. The observer is not
    /// notified.
    pub fn reset(&self, total_fovs: usize) {
        let mut inner = self.inner.lock();
        inner.state = TimepointState::Acquiring;
        inner.fovs_remaining = total_fovs;
        inner.retake_list.clear();
        self.pause_requested.store(false, Ordering::Release);
        self.resume_signal.clear();
        debug!(total_fovs, "Timepoint state machine reset");
    }

    // --- Pause/Resume ---

    /// Ask the worker to pause after its current FOV (UI thread).
    ///
    /// Accepted in `Acquiring` and `Captured`; the state itself only changes
    /// when the worker calls [`complete_pause`](Self::complete_pause).
    pub fn request_pause(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            TimepointState::Acquiring | TimepointState::Captured => {
                self.pause_requested.store(true, Ordering::Release);
                info!(state = %inner.state, "Pause requested");
                true
            }
            TimepointState::Paused | TimepointState::Retaking => false,
        }
    }

    /// Whether a pause is pending (worker thread).
    #[must_use]
    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::Acquire)
    }

    /// Enter `Paused` once in-flight work is finished (worker thread).
    ///
    /// Only succeeds if a pause was requested; consumes the request.
    pub fn complete_pause(&self) -> bool {
        let mut inner = self.inner.lock();
        let pausable = matches!(
            inner.state,
            TimepointState::Acquiring | TimepointState::Captured
        );
        if !pausable || !self.pause_requested.load(Ordering::Acquire) {
            return false;
        }
        self.pause_requested.store(false, Ordering::Release);
        inner.transition(TimepointState::Paused);
        true
    }

    /// Leave `Paused` (UI thread).
    ///
    /// Goes to `Acquiring` when FOVs remain, otherwise to `Captured`, and
    /// wakes a worker blocked in [`wait_for_resume`](Self::wait_for_resume).
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != TimepointState::Paused {
            return false;
        }
        let next = if inner.fovs_remaining > 0 {
            TimepointState::Acquiring
        } else {
            TimepointState::Captured
        };
        inner.transition(next);
        self.resume_signal.set();
        info!(state = %next, fovs_remaining = inner.fovs_remaining, "Resumed");
        true
    }

    /// Block until resumed or `timeout` elapses (worker thread). `None` waits
    /// indefinitely.
    ///
    /// Returns `false` on timeout. The signal is cleared on return either way
    /// so it can be reused for the next pause cycle; it is single-shot, so
    /// only one waiter is released per signal.
    pub fn wait_for_resume(&self, timeout: Option<Duration>) -> bool {
        self.resume_signal.wait_and_clear(timeout)
    }

    // --- Retake ---

    /// Start re-acquiring `fovs` (UI thread).
    ///
    /// Only from `Paused` and only with a non-empty list. Replaces the retake
    /// worklist and wakes a waiting worker.
    pub fn retake(&self, fovs: &[FovIdentifier]) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != TimepointState::Paused || fovs.is_empty() {
            return false;
        }
        inner.retake_list = fovs.to_vec();
        inner.transition(TimepointState::Retaking);
        self.resume_signal.set();
        info!(count = fovs.len(), "Retake started");
        true
    }

    /// Copy of the retake worklist, in the order it was given.
    #[must_use]
    pub fn retake_list(&self) -> Vec<FovIdentifier> {
        self.inner.lock().retake_list.clone()
    }

    /// Finish retaking and return to `Paused` (worker thread).
    pub fn complete_retakes(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != TimepointState::Retaking {
            return false;
        }
        inner.retake_list.clear();
        inner.transition(TimepointState::Paused);
        true
    }

    // --- FOV tracking ---

    /// Count one FOV as captured. Never goes below zero.
    pub fn mark_fov_captured(&self) {
        let mut inner = self.inner.lock();
        inner.fovs_remaining = inner.fovs_remaining.saturating_sub(1);
    }

    /// Jump to `Captured` from `Acquiring`, regardless of the remaining count.
    pub fn mark_all_captured(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != TimepointState::Acquiring {
            return false;
        }
        inner.transition(TimepointState::Captured);
        true
    }

    /// FOVs still to capture in this timepoint.
    #[must_use]
    pub fn fovs_remaining(&self) -> usize {
        self.inner.lock().fovs_remaining
    }

    // --- Abort ---

    /// Abort the current operation (UI thread).
    ///
    /// In `Retaking` this cancels only the retake: the worklist is cleared,
    /// the machine returns to `Paused` and a waiting worker is woken. In every
    /// other state nothing changes and the caller is told to unwind the whole
    /// acquisition.
    pub fn abort(&self) -> AbortOutcome {
        let mut inner = self.inner.lock();
        if inner.state == TimepointState::Retaking {
            inner.retake_list.clear();
            inner.transition(TimepointState::Paused);
            self.resume_signal.set();
            info!("Retake aborted");
            AbortOutcome::RetakeCancelled
        } else {
            info!(state = %inner.state, "Acquisition abort requested");
            AbortOutcome::AbortAcquisition
        }
    }

    /// State, counters and flags read under one lock.
    #[must_use]
    pub fn snapshot(&self) -> TimepointSnapshot {
        let inner = self.inner.lock();
        TimepointSnapshot {
            state: inner.state,
            fovs_remaining: inner.fovs_remaining,
            pause_requested: self.pause_requested.load(Ordering::Acquire),
            retake_count: inner.retake_list.len(),
        }
    }

    // --- Observer ---

    /// Deliver every state change to `observer` on a dedicated notifier
    /// thread.
    ///
    /// The observer never runs while the state lock is held, so it may call
    /// back into the machine. Replaces any previous observer. Notifications
    /// are dropped with a warning if the observer falls
    /// [`NOTIFY_QUEUE_DEPTH`](daq_core::limits::NOTIFY_QUEUE_DEPTH) behind.
    pub fn set_state_observer<F>(&self, observer: F) -> FlowResult<()>
    where
        F: Fn(TimepointState) + Send + 'static,
    {
        let notifier = StateNotifier::spawn(observer)?;
        self.inner.lock().notifier = Some(notifier);
        Ok(())
    }

    /// Stop delivering state changes. Already queued notifications still
    /// reach the old observer.
    pub fn clear_state_observer(&self) {
        self.inner.lock().notifier = None;
    }
}

impl std::fmt::Debug for TimepointStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimepointStateMachine")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    fn paused(total_fovs: usize) -> TimepointStateMachine {
        let sm = TimepointStateMachine::new();
        sm.reset(total_fovs);
        assert!(sm.request_pause());
        assert!(sm.complete_pause());
        sm
    }

    #[test]
    fn initial_state() {
        let sm = TimepointStateMachine::new();
        assert_eq!(sm.state(), TimepointState::Acquiring);
        assert_eq!(sm.fovs_remaining(), 0);
        assert!(!sm.is_pause_requested());
        assert!(sm.retake_list().is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let sm = paused(5);
        assert!(sm.retake(&[FovIdentifier::new("A1", 0)]));

        sm.reset(10);
        let snapshot = sm.snapshot();
        assert_eq!(snapshot.state, TimepointState::Acquiring);
        assert_eq!(snapshot.fovs_remaining, 10);
        assert_eq!(snapshot.retake_count, 0);
        assert!(!snapshot.pause_requested);
        // The retake's wake signal was cleared too
        assert!(!sm.wait_for_resume(Some(Duration::from_millis(10))));
    }

    #[test]
    fn pause_is_two_phase() {
        let sm = TimepointStateMachine::new();
        sm.reset(5);

        assert!(sm.request_pause());
        assert!(sm.is_pause_requested());
        assert_eq!(sm.state(), TimepointState::Acquiring);

        assert!(sm.complete_pause());
        assert_eq!(sm.state(), TimepointState::Paused);
        assert!(!sm.is_pause_requested());
    }

    #[test]
    fn complete_pause_needs_a_request() {
        let sm = TimepointStateMachine::new();
        sm.reset(5);
        assert!(!sm.complete_pause());
        assert_eq!(sm.state(), TimepointState::Acquiring);
    }

    #[test]
    fn pause_from_captured() {
        let sm = TimepointStateMachine::new();
        sm.reset(1);
        assert!(sm.mark_all_captured());
        assert!(sm.request_pause());
        assert!(sm.complete_pause());
        assert_eq!(sm.state(), TimepointState::Paused);
    }

    #[test]
    fn pause_request_survives_mark_all_captured() {
        let sm = TimepointStateMachine::new();
        sm.reset(1);
        assert!(sm.request_pause());
        assert!(sm.mark_all_captured());
        assert!(sm.complete_pause());
        assert_eq!(sm.state(), TimepointState::Paused);
    }

    #[test]
    fn resume_picks_next_state_from_remaining_fovs() {
        let sm = paused(3);
        assert!(sm.resume());
        assert_eq!(sm.state(), TimepointState::Acquiring);

        let sm = paused(1);
        sm.mark_fov_captured();
        assert!(sm.resume());
        assert_eq!(sm.state(), TimepointState::Captured);
    }

    #[test]
    fn resume_rejected_unless_paused() {
        let sm = TimepointStateMachine::new();
        sm.reset(5);
        assert!(!sm.resume());
        assert_eq!(sm.state(), TimepointState::Acquiring);
    }

    #[test]
    fn second_resume_loses_the_race() {
        let sm = Arc::new(paused(5));
        let wins: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| sm.resume())).collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });
        assert_eq!(wins, 1);
    }

    #[test]
    fn wait_for_resume_times_out() {
        let sm = paused(5);
        let started = Instant::now();
        assert!(!sm.wait_for_resume(Some(Duration::from_millis(50))));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn wait_for_resume_released_by_resume() {
        let sm = Arc::new(paused(5));
        let worker = {
            let sm = Arc::clone(&sm);
            thread::spawn(move || sm.wait_for_resume(Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(sm.resume());
        assert!(worker.join().unwrap());
    }

    #[test]
    fn wait_for_resume_signal_is_single_shot() {
        let sm = paused(5);
        assert!(sm.resume());
        // Already signalled: returns at once, then the signal is spent
        assert!(sm.wait_for_resume(Some(Duration::from_millis(10))));
        assert!(!sm.wait_for_resume(Some(Duration::from_millis(10))));
    }

    #[test]
    fn wait_without_timeout_returns_once_resumed() {
        let sm = Arc::new(paused(5));
        let worker = {
            let sm = Arc::clone(&sm);
            thread::spawn(move || sm.wait_for_resume(None))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(sm.resume());
        assert!(worker.join().unwrap());
    }

    #[test]
    fn retake_from_paused() {
        let sm = paused(5);
        let fovs = [FovIdentifier::new("A1", 0), FovIdentifier::new("A1", 1)];

        assert!(sm.retake(&fovs));
        assert_eq!(sm.state(), TimepointState::Retaking);
        assert_eq!(sm.retake_list(), fovs);
        // Wakes the worker waiting for a decision
        assert!(sm.wait_for_resume(Some(Duration::from_millis(10))));
    }

    #[test]
    fn retake_rejects_empty_list() {
        let sm = paused(5);
        assert!(!sm.retake(&[]));
        assert_eq!(sm.state(), TimepointState::Paused);
    }

    #[test]
    fn retake_rejected_while_acquiring() {
        let sm = TimepointStateMachine::new();
        sm.reset(5);
        assert!(!sm.retake(&[FovIdentifier::new("A1", 0)]));
        assert_eq!(sm.state(), TimepointState::Acquiring);
    }

    #[test]
    fn retake_list_is_a_copy() {
        let sm = paused(5);
        assert!(sm.retake(&[FovIdentifier::new("A1", 0)]));

        let mut copy = sm.retake_list();
        copy.push(FovIdentifier::new("B2", 3));
        copy.clear();
        assert_eq!(sm.retake_list(), vec![FovIdentifier::new("A1", 0)]);
    }

    #[test]
    fn complete_retakes_returns_to_paused() {
        let sm = paused(5);
        assert!(sm.retake(&[FovIdentifier::new("A1", 0)]));
        assert!(sm.complete_retakes());
        assert_eq!(sm.state(), TimepointState::Paused);
        assert!(sm.retake_list().is_empty());
        assert!(!sm.complete_retakes());
    }

    #[test]
    fn mark_fov_captured_floors_at_zero() {
        let sm = TimepointStateMachine::new();
        sm.reset(2);
        sm.mark_fov_captured();
        sm.mark_fov_captured();
        sm.mark_fov_captured();
        assert_eq!(sm.fovs_remaining(), 0);
    }

    #[test]
    fn mark_all_captured_only_from_acquiring() {
        let sm = TimepointStateMachine::new();
        sm.reset(5);
        assert!(sm.mark_all_captured());
        assert_eq!(sm.state(), TimepointState::Captured);
        // Remaining count is left alone
        assert_eq!(sm.fovs_remaining(), 5);
        assert!(!sm.mark_all_captured());

        let sm = paused(5);
        assert!(!sm.mark_all_captured());
    }

    #[test]
    fn abort_during_retake_cancels_only_the_retake() {
        let sm = paused(5);
        assert!(sm.retake(&[FovIdentifier::new("A1", 0)]));
        assert!(sm.wait_for_resume(Some(Duration::from_millis(10))));

        let outcome = sm.abort();
        assert_eq!(outcome, AbortOutcome::RetakeCancelled);
        assert_eq!(outcome.as_tuple(), (true, false));
        assert_eq!(sm.state(), TimepointState::Paused);
        assert!(sm.retake_list().is_empty());
        assert!(sm.wait_for_resume(Some(Duration::from_millis(10))));
    }

    #[test]
    fn abort_elsewhere_aborts_acquisition() {
        let sm = TimepointStateMachine::new();
        sm.reset(5);
        assert_eq!(sm.abort().as_tuple(), (true, true));
        assert_eq!(sm.state(), TimepointState::Acquiring);

        let sm = paused(5);
        assert_eq!(sm.abort(), AbortOutcome::AbortAcquisition);
        assert_eq!(sm.state(), TimepointState::Paused);
    }

    #[test]
    fn observer_sees_changes_in_order() {
        let (tx, rx) = mpsc::channel();
        let sm = TimepointStateMachine::new();
        sm.reset(5);
        sm.set_state_observer(move |state| {
            let _ = tx.send(state);
        })
        .unwrap();

        assert!(sm.request_pause());
        assert!(sm.complete_pause());
        assert!(sm.retake(&[FovIdentifier::new("A1", 0)]));
        assert!(sm.complete_retakes());
        assert!(sm.resume());

        let seen: Vec<_> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(
            seen,
            vec![
                TimepointState::Paused,
                TimepointState::Retaking,
                TimepointState::Paused,
                TimepointState::Acquiring,
            ]
        );
    }

    #[test]
    fn observer_may_reenter_the_machine() {
        let sm = Arc::new(TimepointStateMachine::new());
        sm.reset(5);
        let (tx, rx) = mpsc::channel();
        let weak = Arc::downgrade(&sm);
        sm.set_state_observer(move |state| {
            if let Some(sm) = weak.upgrade() {
                let _ = tx.send((state, sm.state()));
            }
        })
        .unwrap();

        assert!(sm.request_pause());
        assert!(sm.complete_pause());
        let (notified, read_back) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(notified, TimepointState::Paused);
        assert_eq!(read_back, TimepointState::Paused);
    }

    #[test]
    fn no_notification_without_change_or_after_clear() {
        let (tx, rx) = mpsc::channel();
        let sm = TimepointStateMachine::new();
        sm.reset(5);
        sm.set_state_observer(move |state| {
            let _ = tx.send(state);
        })
        .unwrap();

        // Flag only, no state change
        assert!(sm.request_pause());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        sm.clear_state_observer();
        assert!(sm.complete_pause());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn display_and_serde_names() {
        assert_eq!(TimepointState::Retaking.to_string(), "retaking");
        let snapshot = paused(3).snapshot();
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["state"], "paused");
        assert_eq!(json["fovs_remaining"], 3);
        assert_eq!(
            serde_json::to_value(AbortOutcome::RetakeCancelled).unwrap(),
            "retake_cancelled"
        );
    }
}
