//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint or lost-update conflict.
    ///
    /// This covers both the shared-pair dedup tables (two writers inserting
    /// the same pair) and interval closes that lost a race (the target row
    /// was already closed). Conflicts are the only retryable store error.
    #[error("store conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// A row referenced by a write does not exist.
    #[error("missing row: {message}")]
    MissingRow {
        /// Description of the missing row.
        message: String,
    },

    /// A write violated a table invariant.
    ///
    /// Invariant violations indicate a defective caller, never a transient
    /// condition, and must not be retried.
    #[error("invariant violation: {message}")]
    Invariant {
        /// Description of the violation.
        message: String,
    },

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a missing-row error.
    pub fn missing_row(message: impl Into<String>) -> Self {
        Self::MissingRow {
            message: message.into(),
        }
    }

    /// Creates an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Returns true if the error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
