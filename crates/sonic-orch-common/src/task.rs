//! Task processing status and error types.

use thiserror::Error;

/// Outcome of an entry that could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Entry rejected as invalid; it is dropped
    InvalidEntry,
    /// Entry depends on something not there yet; it is queued again
    NeedRetry,
}

impl TaskStatus {
    /// Returns true if the entry should be handed back to its consumer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::NeedRetry)
    }
}

/// Error type for entry processing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Invalid entry: {message}")]
    InvalidEntry { message: String },

    #[error("Retry needed: {reason}")]
    NeedRetry { reason: String },
}

impl TaskError {
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        TaskError::InvalidEntry {
            message: message.into(),
        }
    }

    pub fn need_retry(reason: impl Into<String>) -> Self {
        TaskError::NeedRetry {
            reason: reason.into(),
        }
    }

    /// Maps the error onto the status the daemon loop acts on.
    pub fn to_status(&self) -> TaskStatus {
        match self {
            TaskError::InvalidEntry { .. } => TaskStatus::InvalidEntry,
            TaskError::NeedRetry { .. } => TaskStatus::NeedRetry,
        }
    }
}
