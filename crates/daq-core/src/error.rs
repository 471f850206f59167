//! Error types for acquisition flow control.
//!
//! `FlowError` is the single error type shared by the backpressure and
//! experiment crates. Ordinary flow-control conditions (throttling, soft
//! timeouts, illegal state transitions) are never errors: they are encoded
//! in return values. `FlowError` covers the things that genuinely fail:
//!
//! - **`Io`**: creating, sizing or mapping the shared admission region.
//! - **`Config`**: Figment could not parse or merge a configuration source.
//! - **`Configuration`**: values parsed but are semantically invalid.
//! - **`InvalidSharedState`**: an existing region failed header validation.
//! - **`ResetWithPendingJobs`**: counters were reset while jobs were in flight.
//!   The reset still happened; the variant exists so callers and tests can see
//!   the underflow hazard explicitly.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using [`FlowError`].
pub type FlowResult<T> = std::result::Result<T, FlowError>;

/// Primary error type for acquisition flow control.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Standard I/O operation failed.
    ///
    /// Raised while creating, resizing or memory-mapping the backing file of a
    /// shared admission region.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration source could not be parsed or merged.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration validation failed.
    ///
    /// Values parsed correctly but are logically invalid (e.g. `max_jobs = 0`).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A shared admission region failed validation when attached.
    #[error("Invalid shared admission state at {path:?}: {reason}")]
    InvalidSharedState {
        /// Backing file that was opened.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Counters were zeroed while jobs were still outstanding.
    ///
    /// Both counters have already been reset when this is returned. Once the
    /// outstanding jobs complete they will decrement past zero, so this is a
    /// caller bug, not a transient condition.
    #[error(
        "Backpressure reset with {pending_jobs} jobs ({pending_bytes} bytes) pending; \
         counters may underflow when they complete"
    )]
    ResetWithPendingJobs {
        /// Jobs in flight at the moment of the reset.
        pending_jobs: i64,
        /// Bytes in flight at the moment of the reset.
        pending_bytes: i64,
    },
}

impl From<figment::Error> for FlowError {
    fn from(err: figment::Error) -> Self {
        FlowError::Config(Box::new(err))
    }
}
