//! Narrated caption video render worker.
//!
//! This crate provides:
//! - The per-job pipeline (fetch, align, composite, assemble, upload)
//! - A bounded-concurrency job runner with cancellation and timeouts
//! - Worker configuration, structured job logging and metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod runner;

pub use config::WorkerConfig;
pub use error::{JobFailure, WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{JobOutcome, JobWorkspace, Pipeline, RenderReport, StageTracker};
pub use runner::{JobHandle, JobResult, JobRunner};
