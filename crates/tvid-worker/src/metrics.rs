//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tvid_models::{ErrorKind, JobStatus};

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "tvid_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "tvid_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "tvid_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "tvid_job_duration_seconds";
    pub const STAGE_DURATION_SECONDS: &str = "tvid_stage_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "tvid_upload_duration_seconds";
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {e}")))
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "done").record(duration_secs);
}

pub fn record_job_failed(kind: ErrorKind, duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(duration_secs);
}

pub fn record_stage(stage: JobStatus, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage.as_str()).record(duration_secs);
}

pub fn record_upload(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}
