//! Domain error types.

use thiserror::Error;

/// Malformed subscription or incident parameters.
///
/// Raised at the room index boundary; invalid input never enters the room table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    /// Wraps a field-level error produced by `shared::validation`.
    pub fn from_field(field: &'static str, err: validator::ValidationError) -> Self {
        let message = err
            .message
            .map(|m| m.to_string())
            .unwrap_or_else(|| err.code.to_string());
        Self { field, message }
    }
}

/// The external risk-scoring service failed, timed out or is switched off.
///
/// Callers convert this into a structurally valid default response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ML service unavailable: {reason}")]
pub struct UpstreamUnavailable {
    pub reason: String,
}

impl UpstreamUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
