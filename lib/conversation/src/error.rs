//! Error types for the conversation crate.
//!
//! - `StateError`: conversation state load/save failures
//! - `RecordError`: failures writing or reading sent-message records,
//!   execution logs and daily claims

use std::fmt;

/// Errors from conversation state operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Storage operation failed.
    StorageFailed { reason: String },
    /// The stored context could not be decoded.
    InvalidData { reason: String },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { reason } => {
                write!(f, "conversation state storage failed: {reason}")
            }
            Self::InvalidData { reason } => {
                write!(f, "invalid conversation state: {reason}")
            }
        }
    }
}

impl std::error::Error for StateError {}

/// Errors from record-keeping stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Storage operation failed.
    StorageFailed { store: &'static str, reason: String },
    /// A stored record could not be decoded.
    InvalidData { store: &'static str, reason: String },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { store, reason } => {
                write!(f, "{store} storage failed: {reason}")
            }
            Self::InvalidData { store, reason } => {
                write!(f, "invalid {store} record: {reason}")
            }
        }
    }
}

impl std::error::Error for RecordError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_error_display() {
        let err = StateError::StorageFailed {
            reason: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "conversation state storage failed: connection reset"
        );
    }

    #[test]
    fn record_error_names_store() {
        let err = RecordError::StorageFailed {
            store: "sent message",
            reason: "timeout".to_string(),
        };
        assert!(err.to_string().starts_with("sent message storage failed"));
    }
}
