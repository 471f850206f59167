//! Per-timepoint acquisition control.
//!
//! [`TimepointStateMachine`] coordinates pause, review, selective FOV retake
//! and abort between an operator-facing control thread and the acquisition
//! worker thread. State changes can be observed through a callback that runs
//! on its own notifier thread.

pub mod fov;
mod notifier;
pub mod timepoint;

pub use fov::FovIdentifier;
pub use timepoint::{AbortOutcome, TimepointSnapshot, TimepointState, TimepointStateMachine};
