//! Gateway error types

use thiserror::Error;

use crate::extract::ExtractError;

/// Errors that can occur while talking to the model
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("No response body")]
    NoBody,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Parse(#[from] ExtractError),
}

impl LlmError {
    /// Upstream HTTP status, when the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::ApiError { status, .. } => Some(*status),
            LlmError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
