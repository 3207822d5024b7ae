//! Encoder backends that consume raster frames.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use tvid_models::OutputSpec;

use crate::audio::AudioTrack;
use crate::compositor::RasterFrame;
use crate::error::{MediaError, MediaResult};

/// Where a finished encode lives.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactLocation {
    File(PathBuf),
    Memory,
}

/// What a sink reports once finished.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkOutput {
    pub location: ArtifactLocation,
    pub frames_written: u64,
}

/// Consumes frames in index order and produces an artifact.
///
/// `abort` must release every resource and leave nothing partial behind.
pub trait FrameSink: Send {
    fn begin(&mut self, spec: &OutputSpec, audio: &AudioTrack) -> MediaResult<()>;

    fn push_frame(&mut self, frame: &RasterFrame) -> MediaResult<()>;

    fn finish(&mut self) -> MediaResult<SinkOutput>;

    fn abort(&mut self);
}

/// Keeps frames (or their fingerprints) in memory. Used for previews
/// and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    retain_frames: bool,
    frames: Vec<RasterFrame>,
    fingerprints: Vec<u64>,
    spec: Option<OutputSpec>,
    audio_duration: f64,
    finished: bool,
    aborted: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep full frame buffers instead of fingerprints only.
    pub fn retaining_frames() -> Self {
        Self {
            retain_frames: true,
            ..Self::default()
        }
    }

    pub fn frames(&self) -> &[RasterFrame] {
        &self.frames
    }

    /// One hash per pushed frame, in order.
    pub fn fingerprints(&self) -> &[u64] {
        &self.fingerprints
    }

    pub fn frame_count(&self) -> u64 {
        self.fingerprints.len() as u64
    }

    pub fn audio_duration(&self) -> f64 {
        self.audio_duration
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

fn fingerprint(pixels: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    pixels.hash(&mut hasher);
    hasher.finish()
}

impl FrameSink for MemorySink {
    fn begin(&mut self, spec: &OutputSpec, audio: &AudioTrack) -> MediaResult<()> {
        self.frames.clear();
        self.fingerprints.clear();
        self.spec = Some(spec.clone());
        self.audio_duration = audio.duration();
        self.finished = false;
        self.aborted = false;
        Ok(())
    }

    fn push_frame(&mut self, frame: &RasterFrame) -> MediaResult<()> {
        let Some(spec) = &self.spec else {
            return Err(MediaError::encode("frame pushed before begin"));
        };
        if frame.pixels.len() != spec.resolution.rgba_len() {
            return Err(MediaError::encode(format!(
                "frame {} has {} bytes, expected {}",
                frame.index,
                frame.pixels.len(),
                spec.resolution.rgba_len()
            )));
        }
        self.fingerprints.push(fingerprint(&frame.pixels));
        if self.retain_frames {
            self.frames.push(frame.clone());
        }
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<SinkOutput> {
        if self.spec.is_none() {
            return Err(MediaError::encode("finish called before begin"));
        }
        self.finished = true;
        Ok(SinkOutput {
            location: ArtifactLocation::Memory,
            frames_written: self.frame_count(),
        })
    }

    fn abort(&mut self) {
        self.frames.clear();
        self.fingerprints.clear();
        self.aborted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvid_models::Resolution;

    #[test]
    fn test_memory_sink_collects_frames() {
        let spec = OutputSpec::new(Resolution::new(2, 2), 10.0);
        let audio = AudioTrack::from_pcm(vec![0.0; 8000], 8000, 1).unwrap();
        let mut sink = MemorySink::retaining_frames();

        sink.begin(&spec, &audio).unwrap();
        let frame = RasterFrame::blank(0, 0.0, spec.resolution);
        sink.push_frame(&frame).unwrap();
        sink.push_frame(&frame).unwrap();
        let output = sink.finish().unwrap();

        assert_eq!(output.frames_written, 2);
        assert_eq!(output.location, ArtifactLocation::Memory);
        assert_eq!(sink.fingerprints()[0], sink.fingerprints()[1]);
        assert_eq!(sink.frames().len(), 2);
        assert!((sink.audio_duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_memory_sink_rejects_wrong_size() {
        let spec = OutputSpec::new(Resolution::new(2, 2), 10.0);
        let audio = AudioTrack::from_pcm(vec![0.0; 100], 8000, 1).unwrap();
        let mut sink = MemorySink::new();
        sink.begin(&spec, &audio).unwrap();

        let frame = RasterFrame::blank(0, 0.0, Resolution::new(4, 4));
        assert!(matches!(sink.push_frame(&frame), Err(MediaError::Encode(_))));
    }
}
