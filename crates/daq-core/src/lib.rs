//! `daq-core`
//!
//! Shared building blocks for rust-daq acquisition flow control.
//!
//! ## Modules
//!
//! - [`error`]: [`FlowError`], the workspace error type
//! - [`limits`]: unit conversions, poll intervals and queue depths
//! - [`config`]: Figment-backed [`FlowConfig`] with validation
//! - [`observability`]: `tracing-subscriber` initialisation for binaries

pub mod config;
pub mod error;
pub mod limits;
pub mod observability;

pub use config::{AcquisitionConfig, BackpressureConfig, FlowConfig};
pub use error::{FlowError, FlowResult};
