//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Video stream information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Frame count when the container reports it
    pub frames: Option<u64>,
    pub codec: String,
}

/// Audio stream information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Stream duration in seconds, falling back to the container duration
    pub duration: f64,
    pub codec: String,
}

/// Media file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds
    pub duration: f64,
    /// File size in bytes
    pub size: u64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    duration: Option<String>,
}

const PROBE_ARGS: [&str; 6] = [
    "-v",
    "quiet",
    "-print_format",
    "json",
    "-show_format",
    "-show_streams",
];

/// Probe a media file for information.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(PROBE_ARGS)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    probe_result(path, output)
}

/// Blocking variant for code already running on the blocking pool.
pub fn probe_media_blocking(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = std::process::Command::new("ffprobe")
        .args(PROBE_ARGS)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    probe_result(path, output)
}

fn probe_result(path: &Path, output: std::process::Output) -> MediaResult<MediaInfo> {
    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(json: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let duration = parse_number::<f64>(probe.format.duration.as_deref()).unwrap_or(0.0);
    let size = parse_number::<u64>(probe.format.size.as_deref()).unwrap_or(0);

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .map(|s| VideoStreamInfo {
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            fps: s
                .avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
                .unwrap_or(30.0),
            frames: parse_number(s.nb_frames.as_deref()),
            codec: s.codec_name.clone().unwrap_or_default(),
        });

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .map(|s| AudioStreamInfo {
            sample_rate: parse_number(s.sample_rate.as_deref()).unwrap_or(0),
            channels: s.channels.unwrap_or(0),
            duration: parse_number(s.duration.as_deref()).unwrap_or(duration),
            codec: s.codec_name.clone().unwrap_or_default(),
        });

    Ok(MediaInfo {
        duration,
        size,
        video,
        audio,
    })
}

fn parse_number<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "avg_frame_rate": "30/1", "nb_frames": "135"},
                {"codec_type": "audio", "codec_name": "aac", "sample_rate": "24000",
                 "channels": 1, "duration": "4.480000"}
            ],
            "format": {"duration": "4.500000", "size": "81234"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 4.5).abs() < 1e-9);
        let video = info.video.unwrap();
        assert_eq!((video.width, video.height), (1280, 720));
        assert_eq!(video.frames, Some(135));
        let audio = info.audio.unwrap();
        assert_eq!(audio.sample_rate, 24000);
        assert!((audio.duration - 4.48).abs() < 1e-9);
    }

    #[test]
    fn test_audio_only_file() {
        let json = br#"{"streams": [{"codec_type": "audio", "sample_rate": "16000", "channels": 1}],
                        "format": {"duration": "2.0"}}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.video.is_none());
        assert!((info.audio.unwrap().duration - 2.0).abs() < 1e-9);
    }
}
