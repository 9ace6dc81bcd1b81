//! Error types for the master engine.

use bitempo_storage::StoreError;
use thiserror::Error;

/// Result type for master operations.
pub type MasterResult<T> = Result<T, MasterError>;

/// Errors that can occur in master operations.
#[derive(Debug, Error)]
pub enum MasterError {
    /// The requested document does not exist.
    ///
    /// Never produced by retry exhaustion; a persistent write conflict stays
    /// a [`MasterError::StorageConflict`].
    #[error("document not found: {message}")]
    NotFound {
        /// Description of what was missing.
        message: String,
    },

    /// A request or document failed validation. Fatal, never retried.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the failure.
        message: String,
    },

    /// A write conflict persisted through every retry.
    #[error("storage conflict after {attempts} attempts: {message}")]
    StorageConflict {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the conflict.
        message: String,
    },

    /// Storage handed back rows the engine cannot reconcile, such as a
    /// duplicate version id in one result set. A defect, never retried.
    #[error("malformed result: {message}")]
    MalformedResult {
        /// Description of the defect.
        message: String,
    },

    /// Non-conflict storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Payload encode/decode failure reported by the adapter.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl MasterError {
    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a malformed-result error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResult {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}
