//! Narration audio: decoding, analysis buffer and mux source.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;

/// Sample rate of the mono analysis buffer.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16_000;

/// Audio decode timeout.
const DECODE_TIMEOUT_SECS: u64 = 120;

/// Where the muxer reads the narration from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Any file FFmpeg can decode
    File(PathBuf),
    /// Interleaved f32 samples held in memory
    Pcm {
        samples: Arc<Vec<f32>>,
        sample_rate: u32,
        channels: u16,
    },
}

/// Decoded narration owned by one job.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    sample_rate: u32,
    channels: u16,
    duration: f64,
    analysis: Arc<Vec<f32>>,
    source: AudioSource,
}

impl AudioTrack {
    /// Decode an audio file into a 16 kHz mono analysis buffer.
    ///
    /// Any decode failure is an alignment failure: the narration cannot be read.
    pub async fn load(path: impl AsRef<Path>, cancel: &CancelToken) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::alignment(format!(
                "audio file not found: {}",
                path.display()
            )));
        }

        let info = probe_media(path).await.map_err(|e| match e {
            MediaError::FfprobeNotFound => e,
            other => MediaError::alignment(format!("unreadable audio: {other}")),
        })?;
        let stream = info
            .audio
            .ok_or_else(|| MediaError::alignment(format!("no audio stream in {}", path.display())))?;

        let scratch = tempfile::Builder::new()
            .prefix("tvid-audio-")
            .suffix(".f32")
            .tempfile()?;

        debug!(
            input = %path.display(),
            output = %scratch.path().display(),
            "Decoding narration for analysis"
        );

        let cmd = FfmpegCommand::new(path, scratch.path()).output_args([
            "-vn",
            "-ar",
            &ANALYSIS_SAMPLE_RATE.to_string(),
            "-ac",
            "1",
            "-f",
            "f32le",
        ]);

        FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .with_timeout(DECODE_TIMEOUT_SECS)
            .run(&cmd)
            .await
            .map_err(|e| match e {
                MediaError::Cancelled | MediaError::FfmpegNotFound => e,
                other => MediaError::alignment(format!("unreadable audio: {other}")),
            })?;

        let bytes = tokio::fs::read(scratch.path()).await?;
        let analysis = samples_from_le_bytes(&bytes);
        if analysis.is_empty() {
            return Err(MediaError::alignment(format!(
                "no audio samples decoded from {}",
                path.display()
            )));
        }

        let decoded = analysis.len() as f64 / ANALYSIS_SAMPLE_RATE as f64;
        let duration = if stream.duration > 0.0 {
            stream.duration
        } else {
            decoded
        };

        debug!(
            duration_secs = duration,
            sample_rate = stream.sample_rate,
            channels = stream.channels,
            "Narration decoded"
        );

        Ok(Self {
            sample_rate: stream.sample_rate,
            channels: stream.channels.max(1),
            duration,
            analysis: Arc::new(analysis),
            source: AudioSource::File(path.to_path_buf()),
        })
    }

    /// Wrap interleaved PCM already in memory.
    pub fn from_pcm(samples: Vec<f32>, sample_rate: u32, channels: u16) -> MediaResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(MediaError::config(format!(
                "invalid PCM format: {sample_rate} Hz, {channels} channels"
            )));
        }

        let frames = samples.len() / channels as usize;
        let duration = frames as f64 / sample_rate as f64;
        let mono = downmix(&samples, channels);
        let analysis = resample_linear(&mono, sample_rate, ANALYSIS_SAMPLE_RATE);

        Ok(Self {
            sample_rate,
            channels,
            duration,
            analysis: Arc::new(analysis),
            source: AudioSource::Pcm {
                samples: Arc::new(samples),
                sample_rate,
                channels,
            },
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// 16 kHz mono samples used for alignment.
    pub fn analysis_samples(&self) -> &[f32] {
        &self.analysis
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }

    /// Write in-memory PCM as raw f32le so FFmpeg can mux it.
    pub fn write_raw(&self, path: &Path) -> MediaResult<()> {
        match &self.source {
            AudioSource::Pcm { samples, .. } => {
                let mut bytes = Vec::with_capacity(samples.len() * 4);
                for sample in samples.iter() {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                std::fs::write(path, bytes)?;
                Ok(())
            }
            AudioSource::File(_) => Err(MediaError::config("audio is already file-backed")),
        }
    }
}

/// Convert raw f32le bytes to samples (4 bytes per sample, little-endian).
fn samples_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from as f64 / to as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pcm_stereo_downmix_and_resample() {
        // 0.5 s of stereo at 32 kHz
        let frames = 16_000;
        let mut samples = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            samples.push(0.5);
            samples.push(-0.5);
        }

        let track = AudioTrack::from_pcm(samples, 32_000, 2).unwrap();
        assert!((track.duration() - 0.5).abs() < 1e-9);
        assert_eq!(track.analysis_samples().len(), 8_000);
        assert!(track.analysis_samples().iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_invalid_pcm_format() {
        assert!(AudioTrack::from_pcm(vec![0.0; 10], 0, 1).is_err());
        assert!(AudioTrack::from_pcm(vec![0.0; 10], 16_000, 0).is_err());
    }

    #[test]
    fn test_write_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narration.f32");
        let track = AudioTrack::from_pcm(vec![0.25, -0.25, 1.0], 16_000, 1).unwrap();
        track.write_raw(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(samples_from_le_bytes(&bytes), vec![0.25, -0.25, 1.0]);
    }

    #[tokio::test]
    async fn test_missing_file_is_alignment_error() {
        let err = AudioTrack::load("/nonexistent/narration.wav", &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Alignment(_)));
    }
}
