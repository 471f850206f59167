//! Cross-process backpressure for frame-processing jobs.
//!
//! Captured frames are handed to a separate job-worker process for encoding
//! and saving. If acquisition outpaces that worker, queued frames pile up in
//! RAM. This crate bounds that growth:
//!
//! - [`SharedAdmissionState`]: a memory-mapped pair of counters (pending jobs,
//!   pending bytes) plus a wake signal, shared with the worker process
//! - [`BackpressureController`]: the acquisition-side view that decides when
//!   to hold off and for how long
//!
//! # Ownership Model
//!
//! The region is created either by the controller ([`BackpressureController::new`])
//! or ahead of time ([`SharedAdmissionState::create`]) so a worker can be
//! started before the controller exists. The worker attaches by path with
//! [`SharedAdmissionState::open`] and calls
//! [`record_completion`](SharedAdmissionState::record_completion) when it
//! finishes a job. Admission is counted either by the acquisition side through
//! [`BackpressureController::job_dispatched`] or by the worker itself through
//! [`record_dispatch`](SharedAdmissionState::record_dispatch), never both.
//!
//! Cleanup is explicit: [`BackpressureController::close`] drops the
//! controller's handle, and the creating handle unlinks the backing file when
//! it drops. A worker keeps its own mapping until it exits.

pub mod controller;
pub mod shared;

pub use controller::{BackpressureController, BackpressureStats, CapacityWait};
pub use shared::{AdmissionSnapshot, CapacitySignal, SharedAdmissionState, REGION_SIZE};
