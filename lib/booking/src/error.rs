//! Error types for the booking crate.
//!
//! Only storage failures are errors. A full slot, a spoofed id or a stale
//! selection are ordinary flow outcomes.

use std::fmt;

/// Errors from booking operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Storage operation failed.
    StorageFailed { operation: &'static str, reason: String },
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { operation, reason } => {
                write!(f, "booking storage failed during {operation}: {reason}")
            }
        }
    }
}

impl std::error::Error for BookingError {}
