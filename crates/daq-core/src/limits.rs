//! Shared constants for acquisition flow control.
//!
//! This module centralizes:
//! - Unit conversions used by the admission counters
//! - Poll intervals for the two blocking waits
//! - Queue depths for background delivery
//!
//! Using centralized constants keeps the controller, the job worker and the
//! CLI agreeing on units and timing.

use std::time::Duration;

// =============================================================================
// Units
// =============================================================================

/// Bytes per megabyte for all `*_mb` values (binary prefix: 1 MiB).
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Convert a megabyte limit to bytes, saturating on overflow.
#[must_use]
pub fn mb_to_bytes(mb: f64) -> i64 {
    // `as` saturates for out-of-range floats and maps NaN to 0.
    (mb * BYTES_PER_MB as f64) as i64
}

/// Convert a byte count to megabytes.
#[must_use]
pub fn bytes_to_mb(bytes: i64) -> f64 {
    bytes as f64 / BYTES_PER_MB as f64
}

// =============================================================================
// Timing
// =============================================================================

/// Upper bound on a single sleep inside `wait_for_capacity` (100 ms).
///
/// The capacity signal can be missed (cleared by a racing waiter, or set
/// before the waiter cleared it). Bounding each wait guarantees the throttle
/// condition is re-evaluated at least this often.
pub const CAPACITY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Granularity at which a cross-process signal is polled (1 ms).
pub const SIGNAL_POLL_SLICE: Duration = Duration::from_millis(1);

/// Spin iterations on a shared-memory lock before yielding the thread.
pub const LOCK_SPIN_LIMIT: u32 = 64;

// =============================================================================
// Queues
// =============================================================================

/// Maximum undelivered state-change notifications (default: 64).
///
/// Notifications beyond this are dropped with a warning rather than
/// blocking the thread performing the transition.
pub const NOTIFY_QUEUE_DEPTH: usize = 64;
