//! Bounded-concurrency job runner.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tvid_media::cancel_pair;
use tvid_models::{ErrorKind, JobId, JobStatus, RenderJob};

use crate::error::{JobFailure, WorkerError};
use crate::pipeline::{JobOutcome, Pipeline};

pub type JobResult = Result<JobOutcome, JobFailure>;

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    status: watch::Receiver<JobStatus>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<JobResult>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Latest published status.
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Receiver for status updates.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    /// Ask the job to stop at its next cancellation point.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Sender that cancels this job, for callers that outlive the handle.
    pub fn canceller(&self) -> watch::Sender<bool> {
        self.cancel.clone()
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> JobResult {
        let id = self.id;
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(JobFailure::new(id, JobStatus::Pending, &WorkerError::from(e))),
        }
    }
}

/// Runs jobs concurrently, at most `max_concurrent_jobs` at a time.
///
/// Each job gets its own cancel switch and status channel. A job that exceeds
/// the configured timeout is cancelled and reported as such.
#[derive(Clone)]
pub struct JobRunner {
    pipeline: Pipeline,
    job_semaphore: Arc<Semaphore>,
    job_timeout: Duration,
}

impl JobRunner {
    pub fn new(pipeline: Pipeline) -> Self {
        let config = pipeline.config();
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let job_timeout = config.job_timeout;
        Self {
            pipeline,
            job_semaphore,
            job_timeout,
        }
    }

    pub fn available_slots(&self) -> usize {
        self.job_semaphore.available_permits()
    }

    /// Queue `job`; it starts once a slot is free.
    pub fn submit(&self, job: RenderJob) -> JobHandle {
        let id = job.id.clone();
        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);
        let (cancel_tx, cancel) = cancel_pair();
        let timeout_cancel = cancel_tx.clone();

        let pipeline = self.pipeline.clone();
        let semaphore = Arc::clone(&self.job_semaphore);
        let job_timeout = self.job_timeout;

        let task = tokio::spawn(async move {
            let job_id = job.id.clone();
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let failure = JobFailure {
                        job_id,
                        stage: JobStatus::Pending,
                        kind: ErrorKind::Cancelled,
                        message: "runner shut down".to_string(),
                    };
                    status_tx.send_replace(JobStatus::Failed(ErrorKind::Cancelled));
                    return Err(failure);
                }
            };

            let stage_watch = status_tx.subscribe();
            let run = pipeline.run(job, cancel, status_tx);
            tokio::pin!(run);

            tokio::select! {
                result = &mut run => result,
                _ = tokio::time::sleep(job_timeout) => {
                    warn!(job_id = %job_id, timeout_secs = job_timeout.as_secs(), "Job timed out, cancelling");
                    timeout_cancel.send_replace(true);
                    // Let the job unwind so its workspace is released.
                    let stage = *stage_watch.borrow();
                    match run.await {
                        Err(mut failure) if failure.kind == ErrorKind::Cancelled => {
                            failure.message = WorkerError::Timeout(job_timeout.as_secs()).to_string();
                            Err(failure)
                        }
                        Err(failure) => Err(failure),
                        Ok(outcome) => {
                            info!(job_id = %job_id, stage = stage.as_str(), "Job finished while being cancelled");
                            Ok(outcome)
                        }
                    }
                }
            }
        });

        JobHandle {
            id,
            status: status_rx,
            cancel: cancel_tx,
            task,
        }
    }

    /// Refuse new work; queued jobs fail as cancelled.
    pub fn close(&self) {
        self.job_semaphore.close();
    }
}
