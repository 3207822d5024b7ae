//! Streams composed frames into a sink and checks audio/video sync.

use metrics::{counter, histogram};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use tvid_models::OutputSpec;

use super::sink::{ArtifactLocation, FrameSink};
use crate::audio::AudioTrack;
use crate::cancel::CancelToken;
use crate::compositor::RasterFrame;
use crate::error::{MediaError, MediaResult};
use crate::metrics::names;
use crate::probe::probe_media;

/// A finished encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    pub location: ArtifactLocation,
    pub content_type: &'static str,
    pub frame_count: u64,
    /// Seconds of video, padding included
    pub video_duration: f64,
    pub audio_duration: f64,
}

impl EncodedArtifact {
    pub fn path(&self) -> Option<&PathBuf> {
        match &self.location {
            ArtifactLocation::File(path) => Some(path),
            ArtifactLocation::Memory => None,
        }
    }
}

/// Drives a [`FrameSink`] from a frame stream.
#[derive(Debug, Clone)]
pub struct MediaAssembler {
    spec: OutputSpec,
    max_av_drift: f64,
    cancel: CancelToken,
}

impl MediaAssembler {
    /// Fails with an encode error when the output spec is unusable.
    pub fn new(spec: OutputSpec, max_av_drift: f64) -> MediaResult<Self> {
        spec.validate()
            .map_err(|e| MediaError::encode(e.to_string()))?;
        if !max_av_drift.is_finite() || max_av_drift < 0.0 {
            return Err(MediaError::config(format!(
                "max_av_drift must be non-negative, got {max_av_drift}"
            )));
        }
        Ok(Self {
            spec,
            max_av_drift,
            cancel: CancelToken::never(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn spec(&self) -> &OutputSpec {
        &self.spec
    }

    /// Encode every frame, then the audio. On any failure the sink is
    /// aborted and nothing is returned.
    pub fn assemble<I>(
        &self,
        frames: I,
        audio: &AudioTrack,
        sink: &mut dyn FrameSink,
    ) -> MediaResult<EncodedArtifact>
    where
        I: IntoIterator<Item = MediaResult<RasterFrame>>,
    {
        let started = Instant::now();
        if let Err(e) = sink.begin(&self.spec, audio) {
            sink.abort();
            return Err(e);
        }

        match self.stream(frames, audio, sink) {
            Ok(artifact) => {
                let elapsed = started.elapsed().as_secs_f64();
                histogram!(names::ENCODE_DURATION_SECONDS).record(elapsed);
                info!(
                    frames = artifact.frame_count,
                    video_duration = artifact.video_duration,
                    audio_duration = artifact.audio_duration,
                    elapsed_secs = elapsed,
                    "Assembly complete"
                );
                Ok(artifact)
            }
            Err(e) => {
                sink.abort();
                Err(e)
            }
        }
    }

    fn stream<I>(
        &self,
        frames: I,
        audio: &AudioTrack,
        sink: &mut dyn FrameSink,
    ) -> MediaResult<EncodedArtifact>
    where
        I: IntoIterator<Item = MediaResult<RasterFrame>>,
    {
        let resolution = self.spec.resolution;
        let mut last: Option<RasterFrame> = None;
        let mut count: u64 = 0;

        for frame in frames {
            self.cancel.check()?;
            let frame = frame?;
            if frame.index != count {
                return Err(MediaError::encode(format!(
                    "frame {} arrived out of order, expected {}",
                    frame.index, count
                )));
            }
            if frame.resolution() != resolution {
                return Err(MediaError::encode(format!(
                    "frame {} is {}, output is {}",
                    frame.index,
                    frame.resolution(),
                    resolution
                )));
            }
            sink.push_frame(&frame)?;
            count += 1;
            last = Some(frame);
        }

        let interval = self.spec.frame_interval();
        let audio_duration = audio.duration();
        let expected = self.spec.frame_count(audio_duration);
        let video_duration = count as f64 * interval;
        let drift = (video_duration - audio_duration).abs();
        let tolerance = self.max_av_drift + interval;

        if drift > tolerance {
            return Err(MediaError::sync(format!(
                "video is {video_duration:.3}s, audio is {audio_duration:.3}s \
                 (allowed drift {:.3}s)",
                self.max_av_drift
            )));
        }

        let Some(mut held) = last else {
            return Err(MediaError::encode("no frames to encode"));
        };

        let mut padded = 0;
        while count < expected {
            self.cancel.check()?;
            held.index = count;
            held.timestamp = count as f64 * interval;
            sink.push_frame(&held)?;
            count += 1;
            padded += 1;
        }
        if padded > 0 {
            counter!(names::FRAMES_PADDED_TOTAL).increment(padded);
            debug!(padded, "Held last frame to cover the narration");
        }

        let output = sink.finish()?;
        Ok(EncodedArtifact {
            location: output.location,
            content_type: self.spec.container.content_type(),
            frame_count: count,
            video_duration: count as f64 * interval,
            audio_duration,
        })
    }

    /// Probe a file artifact and check its length against what was encoded.
    pub async fn verify_artifact(&self, artifact: &EncodedArtifact) -> MediaResult<()> {
        let Some(path) = artifact.path() else {
            return Ok(());
        };
        let info = probe_media(path).await?;
        let video = info
            .video
            .ok_or_else(|| MediaError::encode(format!("no video stream in {}", path.display())))?;

        let interval = self.spec.frame_interval();
        let tolerance = self.max_av_drift + interval;
        let expected = artifact.video_duration.max(artifact.audio_duration);
        if (info.duration - expected).abs() > tolerance {
            return Err(MediaError::sync(format!(
                "encoded duration {:.3}s, expected {:.3}s",
                info.duration, expected
            )));
        }
        if let Some(frames) = video.frames {
            if frames.abs_diff(artifact.frame_count) > 1 {
                warn!(
                    probed = frames,
                    encoded = artifact.frame_count,
                    "Encoded frame count differs"
                );
                return Err(MediaError::encode(format!(
                    "encoded {} frames, container reports {}",
                    artifact.frame_count, frames
                )));
            }
        }
        if let Some(audio) = info.audio {
            if (audio.duration - artifact.audio_duration).abs() > tolerance
                && audio.duration < artifact.audio_duration
            {
                return Err(MediaError::sync(format!(
                    "encoded audio {:.3}s, narration {:.3}s",
                    audio.duration, artifact.audio_duration
                )));
            }
        }
        Ok(())
    }
}
