//! Artifact storage for the render pipeline.
//!
//! This crate provides:
//! - An S3-compatible object client (GCS interop, R2, S3)
//! - A local filesystem store for development and tests
//! - The `ArtifactStore` seam the pipeline fetches inputs and puts outputs through

pub mod client;
pub mod config;
pub mod error;
pub mod fs_utils;
pub mod local;
pub mod store;

pub use client::S3Store;
pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use local::LocalStore;
pub use store::ArtifactStore;
#[cfg(any(test, feature = "mock"))]
pub use store::MockArtifactStore;
