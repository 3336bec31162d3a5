use serde::{Deserialize, Serialize};

/// API errors surfaced to the caller of the workload store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CorralError {
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl CorralError {
    /// API error code, as rendered by the schema layer.
    pub fn code(&self) -> &'static str {
        match self {
            CorralError::InvalidOption(_) => "InvalidOption",
            CorralError::NotFound(_) => "NotFound",
            CorralError::Conflict(_) => "Conflict",
            CorralError::Internal(_) => "ServerError",
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        CorralError::Internal(e.to_string())
    }
}

pub type CorralResult<T> = Result<T, CorralError>;
