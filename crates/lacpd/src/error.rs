//! Error types for lacpd.
//!
//! Nothing in the engine is fatal: decode failures are counted and dropped,
//! configuration errors are rejected at the boundary before any state is
//! touched.

use std::path::PathBuf;

use sonic_orch_common::TaskError;
use sonic_types::ParseError;
use thiserror::Error;

use crate::pdu::DecodeError;

/// Result type alias for lacpd operations.
pub type LacpResult<T> = Result<T, LacpError>;

/// Errors that can occur in lacpd.
#[derive(Debug, Error)]
pub enum LacpError {
    /// Configuration value rejected at the configuration boundary.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// LAG referenced before it was created.
    #[error("LAG '{lag}' not found")]
    LagNotFound { lag: String },

    /// Interface unknown to the engine.
    #[error("Interface '{interface}' not found")]
    InterfaceNotFound { interface: String },

    /// Interface is already a member of a different LAG.
    #[error("Interface '{interface}' is already a member of {lag}")]
    InterfaceInOtherLag { interface: String, lag: String },

    /// Unknown configuration table.
    #[error("Unknown table '{table}'")]
    UnknownTable { table: String },

    /// Malformed frame.
    #[error("LACPDU decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Malformed primitive value.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Configuration file could not be read or parsed.
    #[error("Config file {path}: {message}")]
    ConfigFile { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LacpError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn lag_not_found(lag: impl Into<String>) -> Self {
        Self::LagNotFound { lag: lag.into() }
    }

    pub fn interface_not_found(interface: impl Into<String>) -> Self {
        Self::InterfaceNotFound {
            interface: interface.into(),
        }
    }

    /// Returns true if the same request may succeed once other
    /// configuration has been applied (e.g. a member arriving before its LAG).
    pub fn is_retryable(&self) -> bool {
        matches!(self, LacpError::LagNotFound { .. })
    }

    /// Maps the error onto the consumer's task outcome.
    pub fn to_task_error(&self) -> TaskError {
        if self.is_retryable() {
            TaskError::need_retry(self.to_string())
        } else {
            TaskError::invalid_entry(self.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_orch_common::TaskStatus;

    #[test]
    fn test_error_display() {
        let err = LacpError::invalid_config("fallback_timeout", "must be 0-900");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for fallback_timeout: must be 0-900"
        );

        let err = LacpError::InterfaceInOtherLag {
            interface: "Ethernet0".to_string(),
            lag: "PortChannel2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Interface 'Ethernet0' is already a member of PortChannel2"
        );
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: LacpError = DecodeError::Truncated { len: 10 }.into();
        assert!(err.to_string().starts_with("LACPDU decode failed"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_task_mapping() {
        assert_eq!(
            LacpError::lag_not_found("PortChannel1")
                .to_task_error()
                .to_status(),
            TaskStatus::NeedRetry
        );
        assert_eq!(
            LacpError::invalid_config("lacp_mode", "bad")
                .to_task_error()
                .to_status(),
            TaskStatus::InvalidEntry
        );
    }
}
