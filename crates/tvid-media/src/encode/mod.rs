//! Encoding: frame sinks and the media assembler.

pub mod assembler;
pub mod ffmpeg;
pub mod sink;

pub use assembler::{EncodedArtifact, MediaAssembler};
pub use ffmpeg::FfmpegSink;
pub use sink::{ArtifactLocation, FrameSink, MemorySink, SinkOutput};
