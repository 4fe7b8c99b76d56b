//! Error types for Weft.
//!
//! This module provides strongly-typed errors with stable codes. Handlers
//! return these to the host; the host reports them and never retries
//! automatically.

use thiserror::Error;

/// The main error type for Weft component operations.
#[derive(Error, Debug)]
pub enum WeftError {
    // =========================================================================
    // Contract Errors (E100-E199)
    // =========================================================================
    /// Payload does not match the shape expected on the port.
    #[error("E101: invalid message on port '{port}': {cause}")]
    InvalidMessage {
        /// The port the message arrived on.
        port: String,
        /// Why the payload was rejected.
        cause: String,
    },

    /// Settings payload does not match the component's settings shape.
    #[error("E102: invalid settings: {cause}")]
    InvalidSettings {
        /// Why the settings were rejected.
        cause: String,
    },

    /// Message delivered on a port the component does not expose.
    #[error("E103: unknown port: {port}")]
    UnknownPort {
        /// The unknown port name.
        port: String,
    },

    // =========================================================================
    // Validation Errors (E200-E299)
    // =========================================================================
    /// Payload is well-shaped but semantically invalid.
    #[error("E201: {cause}")]
    Validation {
        /// Human-readable description of the violation.
        cause: String,
    },

    /// Cron expression failed to parse.
    #[error("E202: invalid schedule {expression:?}: {cause}")]
    Schedule {
        /// The rejected expression.
        expression: String,
        /// Parser error detail.
        cause: String,
    },

    /// Operation requires a started component.
    #[error("E203: {component} is not running")]
    NotRunning {
        /// The component kind that rejected the operation.
        component: String,
    },

    // =========================================================================
    // Store Errors (E300-E399)
    // =========================================================================
    /// Primary key missing, empty, or not a string.
    #[error("E301: {cause}")]
    PrimaryKey {
        /// Description of the key problem.
        cause: String,
    },

    /// Serialized document exceeds the per-record size limit.
    #[error("E302: document too large: {size} bytes (max {max})")]
    DocumentTooLarge {
        /// Serialized size in bytes.
        size: usize,
        /// The configured maximum.
        max: usize,
    },

    /// Store reached its record capacity.
    #[error("E303: store full: {count} records (max {max})")]
    StoreFull {
        /// Current record count.
        count: usize,
        /// The configured maximum.
        max: usize,
    },

    // =========================================================================
    // Runtime Errors (E400-E499)
    // =========================================================================
    /// The invocation's context was cancelled.
    #[error("E401: operation cancelled")]
    Cancelled,

    /// Serialization/deserialization failed on the component's own encode path.
    #[error("E402: serialization error: {0}")]
    Serialization(
        /// The serialization error message.
        String,
    ),
}

impl WeftError {
    /// Get the stable error code (e.g., "E101").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMessage { .. } => "E101",
            Self::InvalidSettings { .. } => "E102",
            Self::UnknownPort { .. } => "E103",
            Self::Validation { .. } => "E201",
            Self::Schedule { .. } => "E202",
            Self::NotRunning { .. } => "E203",
            Self::PrimaryKey { .. } => "E301",
            Self::DocumentTooLarge { .. } => "E302",
            Self::StoreFull { .. } => "E303",
            Self::Cancelled => "E401",
            Self::Serialization(_) => "E402",
        }
    }

    /// Check if this is a shape error (wrong payload structure or port).
    #[must_use]
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMessage { .. } | Self::InvalidSettings { .. } | Self::UnknownPort { .. }
        )
    }

    /// Check if this is a validation error (well-shaped but invalid payload).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Schedule { .. }
                | Self::NotRunning { .. }
                | Self::PrimaryKey { .. }
                | Self::DocumentTooLarge { .. }
                | Self::StoreFull { .. }
        )
    }

    /// Shorthand for a validation error with the given message.
    pub fn validation(cause: impl Into<String>) -> Self {
        Self::Validation {
            cause: cause.into(),
        }
    }

    /// Shorthand for an invalid-message error on the given port.
    pub fn invalid_message(port: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::InvalidMessage {
            port: port.into(),
            cause: cause.into(),
        }
    }

    /// Shorthand for an unknown-port error.
    pub fn unknown_port(port: impl Into<String>) -> Self {
        Self::UnknownPort { port: port.into() }
    }
}

/// Result type alias using [`WeftError`].
pub type Result<T> = std::result::Result<T, WeftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        let err = WeftError::invalid_message("in", "expected object");
        assert_eq!(err.code(), "E101");

        let err = WeftError::StoreFull {
            count: 100,
            max: 100,
        };
        assert_eq!(err.code(), "E303");
    }

    #[test]
    fn error_display() {
        let err = WeftError::Schedule {
            expression: "bad".to_string(),
            cause: "expected five fields".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("E202"));
        assert!(msg.contains("bad"));
    }

    #[test]
    fn classification() {
        assert!(WeftError::unknown_port("x").is_shape_error());
        assert!(!WeftError::unknown_port("x").is_validation_error());

        assert!(WeftError::validation("delay must be positive").is_validation_error());
        assert!(
            WeftError::NotRunning {
                component: "scheduler".to_string()
            }
            .is_validation_error()
        );
        assert!(!WeftError::Cancelled.is_validation_error());
    }
}
