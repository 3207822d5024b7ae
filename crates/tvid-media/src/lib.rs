#![deny(unreachable_patterns)]
//! Media stages of the narrated caption video pipeline.
//!
//! This crate provides:
//! - Alignment of script segments against narration audio
//! - Caption grouping, wrapping and placement
//! - Frame compositing over color, image, slideshow and video backgrounds
//! - Type-safe FFmpeg command building, probing and cancellation
//! - Frame sinks and the audio/video assembler

pub mod alignment;
pub mod audio;
pub mod cancel;
pub mod captions;
pub mod command;
pub mod compositor;
pub mod encode;
pub mod error;
pub mod fonts;
pub mod metrics;
pub mod probe;

pub use alignment::{align, AlignmentEngine};
pub use audio::{AudioSource, AudioTrack};
pub use cancel::{cancel_pair, CancelToken};
pub use captions::{layout, CaptionCanvas, CaptionLayout, FixedAdvance, TextMeasure};
pub use command::{check_ffmpeg, check_ffprobe, create_ffmpeg_command, FfmpegCommand, FfmpegRunner};
pub use compositor::{open_background, Compositor, FrameSource, RasterFrame};
pub use encode::{
    ArtifactLocation, EncodedArtifact, FfmpegSink, FrameSink, MediaAssembler, MemorySink,
};
pub use error::{MediaError, MediaResult};
pub use fonts::{FontCache, FontFace};
pub use probe::{probe_media, probe_media_blocking, MediaInfo};
