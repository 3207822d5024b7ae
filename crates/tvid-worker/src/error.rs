//! Worker error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tvid_models::{ErrorKind, JobId, JobStatus};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job timed out after {0}s")]
    Timeout(u64),

    #[error("Task failed: {0}")]
    Join(String),

    #[error("Media error: {0}")]
    Media(#[from] tvid_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] tvid_storage::StorageError),

    #[error("Invalid job: {0}")]
    Model(#[from] tvid_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Failure category reported for this error raised during `stage`.
    ///
    /// Errors without a category of their own (I/O, panicked tasks) are charged
    /// to the stage that was running.
    pub fn kind(&self, stage: JobStatus) -> ErrorKind {
        match self {
            WorkerError::ConfigError(_) | WorkerError::Model(_) => ErrorKind::Config,
            WorkerError::Cancelled | WorkerError::Timeout(_) => ErrorKind::Cancelled,
            WorkerError::Media(e) => e.kind(),
            WorkerError::Storage(_) => ErrorKind::Storage,
            WorkerError::Join(_) | WorkerError::Io(_) => stage_kind(stage),
        }
    }
}

fn stage_kind(stage: JobStatus) -> ErrorKind {
    match stage {
        JobStatus::Pending => ErrorKind::Config,
        JobStatus::Aligning => ErrorKind::Alignment,
        JobStatus::Compositing => ErrorKind::Render,
        JobStatus::Assembling | JobStatus::Done => ErrorKind::Encode,
        JobStatus::Failed(kind) => kind,
    }
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            WorkerError::Cancelled
        } else {
            WorkerError::Join(e.to_string())
        }
    }
}

/// Structured report of a failed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub job_id: JobId,
    /// Stage that was running when the job failed
    pub stage: JobStatus,
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(job_id: JobId, stage: JobStatus, error: &WorkerError) -> Self {
        Self {
            job_id,
            stage,
            kind: error.kind(stage),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {} failed while {} ({}): {}",
            self.job_id,
            self.stage.as_str(),
            self.kind.as_str(),
            self.message
        )
    }
}

impl std::error::Error for JobFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use tvid_media::MediaError;
    use tvid_storage::StorageError;

    #[test]
    fn test_kind_follows_media_category() {
        let err = WorkerError::from(MediaError::sync("drift"));
        assert_eq!(err.kind(JobStatus::Assembling), ErrorKind::Sync);

        let err = WorkerError::from(MediaError::alignment("too short"));
        assert_eq!(err.kind(JobStatus::Aligning), ErrorKind::Alignment);
    }

    #[test]
    fn test_uncategorized_errors_charge_the_stage() {
        let err = WorkerError::Join("panicked".into());
        assert_eq!(err.kind(JobStatus::Compositing), ErrorKind::Render);
        assert_eq!(err.kind(JobStatus::Aligning), ErrorKind::Alignment);

        let err = WorkerError::from(std::io::Error::other("disk full"));
        assert_eq!(err.kind(JobStatus::Assembling), ErrorKind::Encode);
    }

    #[test]
    fn test_storage_and_cancel_kinds() {
        let err = WorkerError::from(StorageError::upload_failed("503"));
        assert_eq!(err.kind(JobStatus::Assembling), ErrorKind::Storage);
        assert_eq!(WorkerError::Timeout(30).kind(JobStatus::Compositing), ErrorKind::Cancelled);
    }

    #[test]
    fn test_failure_report() {
        let id = JobId::from_string("job-1");
        let failure = JobFailure::new(
            id,
            JobStatus::Aligning,
            &WorkerError::from(MediaError::alignment("audio too short")),
        );
        assert_eq!(failure.kind, ErrorKind::Alignment);
        assert!(failure.to_string().contains("job-1"));

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["job_id"], "job-1");
        assert!(json["message"].as_str().unwrap().contains("audio too short"));
    }
}
