//! ABOUTME: Error types shared across the Truss durable agent execution core
//! ABOUTME: Maps directly onto the error-kind table in the core specification

use thiserror::Error;

/// Comprehensive error enum for the durable agent execution core.
///
/// Each variant corresponds to one row of the error-kind table: whether an
/// error is retryable is a property of the *kind*, not the call site, so
/// callers should consult [`TrussError::is_retryable`] rather than matching
/// on variants when deciding how to treat a failure.
#[derive(Debug, Error)]
pub enum TrussError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("tool '{name}' is not registered")]
    ToolUnregistered { name: String },

    #[error("tool '{name}' execution failed: {message}")]
    ToolExecutionFailed { name: String, message: String },

    #[error("provider returned zero chunks")]
    EmptyCompletion,

    #[error("LLM provider error: {message}")]
    ProviderError { message: String },

    #[error("storage error: {message}")]
    StorageError { message: String },

    #[error("workflow cancelled: {message}")]
    Cancelled { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl TrussError {
    /// Whether the engine's retry policy should retry an activity that
    /// failed with this error, per the core specification's error table.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ToolExecutionFailed { .. }
                | Self::EmptyCompletion
                | Self::ProviderError { .. }
                | Self::StorageError { .. }
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::ProviderError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Convenience Result type alias used throughout the core crates.
pub type Result<T> = std::result::Result<T, TrussError>;
