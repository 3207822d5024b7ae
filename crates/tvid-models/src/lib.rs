//! Shared data models for the tvid render pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Script segments and aligned fragments
//! - Caption configuration and derived caption frames
//! - Text cards drawn over the background
//! - Output encoding parameters
//! - Render jobs, asset references and the job status machine

pub mod caption;
pub mod card;
pub mod color;
pub mod encoding;
pub mod error;
pub mod fragment;
pub mod job;
pub mod script;
pub mod timestamp;

// Re-export common types
pub use caption::{
    CaptionConfig, CaptionFrame, CaptionLine, CaptionStyle, FontSpec, SafeArea, VerticalAnchor,
};
pub use card::{CardLayer, TextCard};
pub use color::Color;
pub use encoding::{Container, OutputSpec, Resolution, VideoCodec};
pub use error::{ModelError, ModelResult};
pub use fragment::{AlignedFragment, AlignmentConfig, AlignmentGranularity};
pub use job::{
    AssetRef, BackgroundFit, BackgroundSpec, ErrorKind, JobId, JobStatus, ObjectScheme,
    RenderJob,
};
pub use script::ScriptSegment;
