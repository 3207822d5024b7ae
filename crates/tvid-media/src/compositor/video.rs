//! Video clip backgrounds decoded by an FFmpeg child process.

use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};
use tvid_models::encoding::format_rate;
use tvid_models::Resolution;

use super::source::FrameSource;
use crate::command::{blocking_ffmpeg_command, drain_stderr, stderr_tail, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media_blocking;

/// Frames further ahead than this restart the decoder instead of reading through.
const MAX_SKIP_SECONDS: f64 = 2.0;

/// A running `ffmpeg ... -f rawvideo -` process.
struct Decoder {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    /// Index of the first frame this process emits
    first_index: u64,
    produced: u64,
}

impl Decoder {
    fn spawn(mut command: Command, first_index: u64) -> std::io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(IoErrorKind::Other, "failed to capture decoder stdout")
        })?;
        let stderr = drain_stderr(&mut child);
        Ok(Self {
            child,
            stdout,
            stderr,
            first_index,
            produced: 0,
        })
    }

    /// Reap the process once its output ends; a non-zero exit is a render error.
    fn finish(&mut self) -> MediaResult<()> {
        let status = self.child.wait()?;
        if status.success() {
            return Ok(());
        }
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        Err(MediaError::render(format!(
            "background decoder failed ({status}): {}",
            stderr_tail(&stderr)
        )))
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Read one full frame. `Ok(false)` on a clean end of stream.
fn read_frame(reader: &mut impl Read, buf: &mut [u8]) -> MediaResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        n => Err(MediaError::render(format!(
            "background video truncated mid-frame ({n} of {} bytes)",
            buf.len()
        ))),
    }
}

/// Background decoded to raw RGBA at the output size and rate.
///
/// Seeking restarts the decoder at the requested offset.
pub struct VideoSource {
    path: PathBuf,
    resolution: Resolution,
    frame_rate: f64,
    duration: Option<f64>,
    decoder: Option<Decoder>,
    /// Index of the frame in `current`
    current_index: Option<u64>,
    current: Vec<u8>,
    scratch: Vec<u8>,
    exhausted: bool,
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("path", &self.path)
            .field("resolution", &self.resolution)
            .field("duration", &self.duration)
            .field("current_index", &self.current_index)
            .finish()
    }
}

impl VideoSource {
    /// Probe the clip; decoding starts on the first frame request.
    pub fn open(path: &Path, resolution: Resolution, frame_rate: f64) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::render(format!(
                "background video not found: {}",
                path.display()
            )));
        }
        let info = probe_media_blocking(path).map_err(|e| match e {
            MediaError::FfprobeNotFound => e,
            other => MediaError::render(format!("unreadable background video: {other}")),
        })?;
        if info.video.is_none() {
            return Err(MediaError::render(format!(
                "no video stream in {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), duration = info.duration, "Opened background video");

        Ok(Self {
            path: path.to_path_buf(),
            resolution,
            frame_rate,
            duration: (info.duration > 0.0).then_some(info.duration),
            decoder: None,
            current_index: None,
            current: vec![0; resolution.rgba_len()],
            scratch: vec![0; resolution.rgba_len()],
            exhausted: false,
        })
    }

    fn decoder_command(&self, first_index: u64) -> FfmpegCommand {
        let (w, h) = (self.resolution.width, self.resolution.height);
        let mut cmd = FfmpegCommand::new(&self.path, "-").log_level("error");
        if first_index > 0 {
            cmd = cmd.seek(first_index as f64 / self.frame_rate);
        }
        cmd.video_filter(format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1"
        ))
        .output_args([
            "-r".to_string(),
            format_rate(self.frame_rate),
            "-an".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
        ])
    }

    fn start(&mut self, first_index: u64) -> MediaResult<()> {
        self.decoder = None;
        self.exhausted = false;

        let args = self.decoder_command(first_index).build_args();
        let mut command = blocking_ffmpeg_command();
        command.args(&args);
        let decoder = Decoder::spawn(command, first_index).map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                MediaError::FfmpegNotFound
            } else {
                MediaError::render(format!("failed to start background decoder: {e}"))
            }
        })?;

        debug!(path = %self.path.display(), first_index, "Started background decoder");
        self.decoder = Some(decoder);
        Ok(())
    }

    /// Advance to frame `target`, holding the last frame at end of stream.
    fn seek_to(&mut self, target: u64) -> MediaResult<()> {
        let restart = match (self.current_index, &self.decoder) {
            (Some(current), Some(_)) => {
                target < current
                    || (!self.exhausted
                        && (target - current) as f64 > MAX_SKIP_SECONDS * self.frame_rate)
            }
            _ => true,
        };
        if restart {
            if self.exhausted && self.current_index.is_some_and(|c| target >= c) {
                return Ok(());
            }
            self.start(target)?;
        }

        while !self.exhausted && self.current_index.map_or(true, |c| c < target) {
            let Some(decoder) = self.decoder.as_mut() else {
                return Err(MediaError::render("background decoder not running"));
            };
            if read_frame(&mut decoder.stdout, &mut self.scratch)? {
                let index = decoder.first_index + decoder.produced;
                decoder.produced += 1;
                std::mem::swap(&mut self.current, &mut self.scratch);
                self.current_index = Some(index);
                continue;
            }

            self.exhausted = true;
            decoder.finish()?;
            if decoder.produced == 0 && self.current_index.is_none() {
                return Err(MediaError::render(format!(
                    "background decoder exited before the first frame: {}",
                    self.path.display()
                )));
            }
            if decoder.produced == 0 {
                warn!(target, "Seek past end of background video, holding last frame");
            } else {
                let end = (decoder.first_index + decoder.produced) as f64 / self.frame_rate;
                if self.duration.map_or(true, |d| end < d) {
                    self.duration = Some(end);
                }
            }
        }
        Ok(())
    }
}

impl FrameSource for VideoSource {
    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn frame_at(&mut self, t: f64, out: &mut [u8]) -> MediaResult<()> {
        let mut target = (t.max(0.0) * self.frame_rate + 1e-6).floor() as u64;
        if let Some(duration) = self.duration {
            let last = ((duration * self.frame_rate - 1e-6).ceil() as u64).saturating_sub(1);
            target = target.min(last);
        }
        if self.current_index != Some(target) {
            self.seek_to(target)?;
        }
        out.copy_from_slice(&self.current);
        Ok(())
    }

    fn rewind(&mut self) -> MediaResult<()> {
        self.decoder = None;
        self.current_index = None;
        self.exhausted = false;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }
}
