//! Model validation errors.

use thiserror::Error;

/// Result type for model validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating caller-supplied models.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Invalid asset reference '{value}': {reason}")]
    InvalidAsset { value: String, reason: String },

    #[error("Invalid color '{0}'")]
    InvalidColor(String),

    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
}

impl ModelError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn invalid_script(msg: impl Into<String>) -> Self {
        Self::InvalidScript(msg.into())
    }

    pub fn invalid_asset(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAsset {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ModelError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidConfig(errors.to_string())
    }
}
