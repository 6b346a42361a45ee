//! Error types for the reconciler
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for reconciler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    /// Management-plane (inventory) errors
    #[error("Management plane error: {0}")]
    ManagementPlane(String),

    /// SDN controller errors
    #[error("Controller error ({controller}): {message}")]
    Controller {
        /// Controller client name
        controller: String,
        /// Error message
        message: String,
    },

    /// Transport-level failure talking to an external system
    #[error("Connectivity error ({system}): {message}")]
    Connectivity {
        /// Which external system failed
        system: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound change event with no defined handling
    #[error("Unsupported event type: {0}")]
    UnsupportedEvent(String),

    /// Child entity created before its parent was known
    #[error("{kind} {id} references missing parent {parent}")]
    ParentMissing {
        /// Entity kind
        kind: &'static str,
        /// Entity identity
        id: Uuid,
        /// Missing parent identity
        parent: Uuid,
    },

    /// Leadership was lost; the process must restart
    #[error("Leadership lost")]
    LeadershipLost,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a management-plane error
    pub fn management(msg: impl Into<String>) -> Self {
        Self::ManagementPlane(msg.into())
    }

    /// Create a controller error
    pub fn controller(controller: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Controller {
            controller: controller.into(),
            message: message.into(),
        }
    }

    /// Create a connectivity error
    pub fn connectivity(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connectivity {
            system: system.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unsupported-event error
    pub fn unsupported_event(event_type: impl Into<String>) -> Self {
        Self::UnsupportedEvent(event_type.into())
    }

    /// Whether this failure means the session to an external system is gone.
    ///
    /// Connectivity faults force a teardown and reconnect in addition to a
    /// resync. Besides the explicit [`Error::Connectivity`] variant, transport
    /// I/O errors and messages carrying the SDK's "connection refused" or
    /// "remote invocation" signatures count.
    pub fn is_connectivity_fault(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            Self::Connectivity { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::BrokenPipe
                    | ErrorKind::TimedOut
            ),
            Self::ManagementPlane(msg) | Self::Other(msg) => has_fault_signature(msg),
            Self::Controller { message, .. } => has_fault_signature(message),
            _ => false,
        }
    }
}

fn has_fault_signature(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("connection refused")
        || lower.contains("remote invocation")
        || lower.contains("vi sdk invoke")
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
