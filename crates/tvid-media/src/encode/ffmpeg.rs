//! FFmpeg-backed sink: raw RGBA over stdin, narration muxed alongside.

use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use tvid_models::encoding::format_rate;
use tvid_models::OutputSpec;

use super::sink::{ArtifactLocation, FrameSink, SinkOutput};
use crate::audio::{AudioSource, AudioTrack};
use crate::command::{
    blocking_ffmpeg_command, check_ffmpeg, drain_stderr, stderr_tail, FfmpegCommand,
};
use crate::compositor::RasterFrame;
use crate::error::{MediaError, MediaResult};

struct Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
}

/// Streams frames into an `ffmpeg` process writing `output`.
pub struct FfmpegSink {
    output: PathBuf,
    encoder: Option<Encoder>,
    /// Raw PCM written for in-memory audio
    temp_audio: Option<PathBuf>,
    frame_len: usize,
    frames_written: u64,
}

impl std::fmt::Debug for FfmpegSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSink")
            .field("output", &self.output)
            .field("running", &self.encoder.is_some())
            .field("frames_written", &self.frames_written)
            .finish()
    }
}

impl FfmpegSink {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            encoder: None,
            temp_audio: None,
            frame_len: 0,
            frames_written: 0,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// The encode command for `spec` with audio read from `audio_path`.
    pub fn build_command(
        &self,
        spec: &OutputSpec,
        audio: &AudioTrack,
        audio_path: &Path,
    ) -> FfmpegCommand {
        let res = spec.resolution;
        let mut cmd = FfmpegCommand::from_stdin(&self.output)
            .raw_video_input("rgba", res.width, res.height, &format_rate(spec.frame_rate))
            .add_input(audio_path);
        if let AudioSource::Pcm {
            sample_rate,
            channels,
            ..
        } = audio.source()
        {
            cmd = cmd.input_args([
                "-f".to_string(),
                "f32le".to_string(),
                "-ar".to_string(),
                sample_rate.to_string(),
                "-ac".to_string(),
                channels.to_string(),
            ]);
        }
        cmd.map("0:v:0")
            .map("1:a:0")
            .audio_filter("apad")
            .output_args(spec.to_ffmpeg_args())
            .output_arg("-shortest")
            .log_level("error")
    }

    fn cleanup_files(&mut self) {
        if let Some(path) = self.temp_audio.take() {
            let _ = std::fs::remove_file(path);
        }
    }

    /// Wait for the process and collect its stderr.
    fn wait(&mut self) -> MediaResult<(std::process::ExitStatus, String)> {
        let Some(mut encoder) = self.encoder.take() else {
            return Err(MediaError::encode("encoder not running"));
        };
        drop(encoder.stdin.take());
        let status = encoder.child.wait()?;
        let stderr = encoder
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        Ok((status, stderr))
    }

    /// Encoder died mid-stream; report why.
    fn broken_pipe(&mut self) -> MediaError {
        let message = match self.wait() {
            Ok((status, stderr)) => format!(
                "ffmpeg exited early ({status}): {}",
                stderr_tail(&stderr)
            ),
            Err(e) => format!("ffmpeg exited early: {e}"),
        };
        MediaError::encode(message)
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, spec: &OutputSpec, audio: &AudioTrack) -> MediaResult<()> {
        check_ffmpeg()?;
        spec.validate()
            .map_err(|e| MediaError::encode(e.to_string()))?;

        let audio_path = match audio.source() {
            AudioSource::File(path) => path.clone(),
            AudioSource::Pcm { .. } => {
                let stem = self
                    .output
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("output");
                let path = self.output.with_file_name(format!("{stem}.audio.f32le"));
                audio.write_raw(&path)?;
                self.temp_audio = Some(path.clone());
                path
            }
        };

        let args = self.build_command(spec, audio, &audio_path).build_args();
        debug!(args = ?args, "Starting encoder");

        let mut child = blocking_ffmpeg_command()
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == IoErrorKind::NotFound {
                    MediaError::FfmpegNotFound
                } else {
                    MediaError::encode(format!("failed to start ffmpeg: {e}"))
                }
            })?;

        let stdin = child.stdin.take();
        let stderr = drain_stderr(&mut child);

        self.encoder = Some(Encoder {
            child,
            stdin,
            stderr,
        });
        self.frame_len = spec.resolution.rgba_len();
        self.frames_written = 0;

        info!(
            output = %self.output.display(),
            codec = spec.codec.encoder(),
            resolution = %spec.resolution,
            fps = spec.frame_rate,
            "Encoder started"
        );
        Ok(())
    }

    fn push_frame(&mut self, frame: &RasterFrame) -> MediaResult<()> {
        if frame.pixels.len() != self.frame_len {
            return Err(MediaError::encode(format!(
                "frame {} has {} bytes, expected {}",
                frame.index,
                frame.pixels.len(),
                self.frame_len
            )));
        }
        let Some(stdin) = self.encoder.as_mut().and_then(|e| e.stdin.as_mut()) else {
            return Err(MediaError::encode("encoder not running"));
        };
        match stdin.write_all(&frame.pixels) {
            Ok(()) => {
                self.frames_written += 1;
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::BrokenPipe => Err(self.broken_pipe()),
            Err(e) => Err(e.into()),
        }
    }

    fn finish(&mut self) -> MediaResult<SinkOutput> {
        if let Some(stdin) = self.encoder.as_mut().and_then(|e| e.stdin.as_mut()) {
            if let Err(e) = stdin.flush() {
                if e.kind() != IoErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }
        let (status, stderr) = self.wait()?;
        self.cleanup_files();

        if !status.success() {
            let _ = std::fs::remove_file(&self.output);
            return Err(MediaError::ffmpeg_failed(
                format!("encode of {} failed", self.output.display()),
                Some(stderr_tail(&stderr)),
                status.code(),
            ));
        }
        if !self.output.exists() {
            return Err(MediaError::encode(format!(
                "ffmpeg produced no output at {}",
                self.output.display()
            )));
        }

        info!(output = %self.output.display(), frames = self.frames_written, "Encoder finished");
        Ok(SinkOutput {
            location: ArtifactLocation::File(self.output.clone()),
            frames_written: self.frames_written,
        })
    }

    fn abort(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            drop(encoder.stdin.take());
            let _ = encoder.child.kill();
            let _ = encoder.child.wait();
            warn!(output = %self.output.display(), "Encoder aborted");
        }
        self.cleanup_files();
        if self.output.exists() {
            let _ = std::fs::remove_file(&self.output);
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.encoder.is_some() {
            self.abort();
        }
        self.cleanup_files();
    }
}
