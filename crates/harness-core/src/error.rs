//! Error types for the harness core
//!
//! Only the store and configuration APIs return [`HarnessResult`]. Tracker
//! callbacks and user-level actions absorb failures into status changes or
//! user notices instead of returning errors.

use thiserror::Error;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error reported by a calling SDK collaborator
///
/// SDK adapters convert whatever their vendor library throws into this
/// type. The harness never inspects it beyond its message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SdkError {
    /// Human readable reason
    pub message: String,
}

impl SdkError {
    /// Create an SDK error from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that can occur in the harness core
#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    /// Collaborator SDK error
    #[error("SDK error: {0}")]
    Sdk(#[from] SdkError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Invalid state error
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Profile not found
    #[error("Profile not found: {login}")]
    ProfileNotFound { login: String },

    /// Invalid DTMF digit
    #[error("Invalid DTMF digit: {digit:?}")]
    InvalidDigit { digit: char },

    /// Storage backend error
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl HarnessError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Check if this error came from the SDK collaborator
    pub fn is_sdk_error(&self) -> bool {
        matches!(self, Self::Sdk(_))
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}
