//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;
use tvid_models::{ErrorKind, ModelError};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during alignment, rendering and encoding.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Alignment failed: {0}")]
    Alignment(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Audio and video out of sync: {0}")]
    Sync(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn alignment(message: impl Into<String>) -> Self {
        Self::Alignment(message.into())
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync(message.into())
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Failure category reported on the job.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::Config(_) | MediaError::Model(_) | MediaError::FileNotFound(_) => {
                ErrorKind::Config
            }
            MediaError::Alignment(_) => ErrorKind::Alignment,
            MediaError::Render(_) | MediaError::Image(_) => ErrorKind::Render,
            MediaError::Sync(_) => ErrorKind::Sync,
            MediaError::Cancelled => ErrorKind::Cancelled,
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::FfmpegFailed { .. }
            | MediaError::FfprobeFailed { .. }
            | MediaError::Encode(_)
            | MediaError::Timeout(_)
            | MediaError::Io(_)
            | MediaError::JsonParse(_) => ErrorKind::Encode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(MediaError::alignment("silent").kind(), ErrorKind::Alignment);
        assert_eq!(MediaError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            MediaError::from(ModelError::invalid_config("x")).kind(),
            ErrorKind::Config
        );
        assert_eq!(
            MediaError::ffmpeg_failed("boom", None, Some(1)).kind(),
            ErrorKind::Encode
        );
    }
}
