//! Output encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 18;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Default frame rate
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Video codec of the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
    Prores,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Prores => "prores_ks",
        }
    }

    /// Output pixel format.
    pub fn pixel_format(&self) -> &'static str {
        match self {
            VideoCodec::Prores => "yuv422p10le",
            _ => "yuv420p",
        }
    }

    /// Audio encoder paired with this codec unless overridden.
    pub fn default_audio_encoder(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "libopus",
            VideoCodec::Prores => "pcm_s16le",
            _ => "aac",
        }
    }

    /// Whether the codec takes `-crf` and `-preset`.
    fn uses_crf(&self) -> bool {
        matches!(self, VideoCodec::H264 | VideoCodec::H265 | VideoCodec::Vp9)
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mov,
    Mkv,
    Webm,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mov => "mov",
            Container::Mkv => "mkv",
            Container::Webm => "webm",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Mov => "video/quicktime",
            Container::Mkv => "video/x-matroska",
            Container::Webm => "video/webm",
        }
    }

    /// Whether the container can carry the codec.
    pub fn supports(&self, codec: VideoCodec) -> bool {
        match self {
            Container::Mp4 => matches!(codec, VideoCodec::H264 | VideoCodec::H265 | VideoCodec::Vp9),
            Container::Mov => matches!(codec, VideoCodec::H264 | VideoCodec::H265 | VideoCodec::Prores),
            Container::Mkv => true,
            Container::Webm => matches!(codec, VideoCodec::Vp9),
        }
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Vertical 9:16 full HD.
    pub const PORTRAIT_HD: Resolution = Resolution::new(1080, 1920);

    /// Bytes in one RGBA frame.
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::PORTRAIT_HD
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encoding parameters for the final artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputSpec {
    #[serde(default)]
    pub codec: VideoCodec,

    #[serde(default)]
    pub container: Container,

    #[serde(default)]
    pub resolution: Resolution,

    /// Frames per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Audio encoder override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Also deliver an SRT sidecar next to the video
    #[serde(default)]
    pub subtitles: bool,
}

fn default_frame_rate() -> f64 {
    DEFAULT_FRAME_RATE
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            codec: VideoCodec::default(),
            container: Container::default(),
            resolution: Resolution::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            crf: DEFAULT_CRF,
            preset: DEFAULT_PRESET.to_string(),
            audio_codec: None,
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            subtitles: false,
        }
    }
}

impl OutputSpec {
    pub fn new(resolution: Resolution, frame_rate: f64) -> Self {
        Self {
            resolution,
            frame_rate,
            ..Default::default()
        }
    }

    /// Returns a new spec with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    pub fn with_container(mut self, codec: VideoCodec, container: Container) -> Self {
        self.codec = codec;
        self.container = container;
        self
    }

    /// Reject specs that cannot be encoded.
    pub fn validate(&self) -> ModelResult<()> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return Err(ModelError::invalid_config(format!(
                "resolution must be non-zero, got {}",
                self.resolution
            )));
        }
        // yuv420p needs even dimensions
        if width % 2 != 0 || height % 2 != 0 {
            return Err(ModelError::invalid_config(format!(
                "resolution must have even dimensions, got {}",
                self.resolution
            )));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(ModelError::invalid_config(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.crf > 51 {
            return Err(ModelError::invalid_config(format!(
                "crf must be 0-51, got {}",
                self.crf
            )));
        }
        if !self.container.supports(self.codec) {
            return Err(ModelError::invalid_config(format!(
                "{:?} cannot be stored in {}",
                self.codec,
                self.container.extension()
            )));
        }
        Ok(())
    }

    /// Seconds between frames.
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.frame_rate
    }

    /// Frames needed to cover `duration` seconds.
    pub fn frame_count(&self, duration: f64) -> u64 {
        if duration <= 0.0 {
            return 0;
        }
        // Guard against 2.0000000001 * 30 rounding up to an extra frame
        let exact = duration * self.frame_rate;
        let rounded = exact.round();
        if (exact - rounded).abs() < 1e-6 {
            rounded as u64
        } else {
            exact.ceil() as u64
        }
    }

    pub fn audio_encoder(&self) -> &str {
        self.audio_codec
            .as_deref()
            .unwrap_or_else(|| self.codec.default_audio_encoder())
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.encoder().to_string()];

        if self.codec.uses_crf() {
            args.extend_from_slice(&["-crf".to_string(), self.crf.to_string()]);
            if self.codec == VideoCodec::Vp9 {
                // constant quality mode for libvpx
                args.extend_from_slice(&["-b:v".to_string(), "0".to_string()]);
            } else {
                args.extend_from_slice(&["-preset".to_string(), self.preset.clone()]);
            }
        }

        args.extend_from_slice(&[
            "-pix_fmt".to_string(),
            self.codec.pixel_format().to_string(),
            "-r".to_string(),
            format_rate(self.frame_rate),
            "-c:a".to_string(),
            self.audio_encoder().to_string(),
        ]);

        if !self.audio_encoder().starts_with("pcm_") {
            args.extend_from_slice(&["-b:a".to_string(), self.audio_bitrate.clone()]);
        }

        if self.container == Container::Mp4 || self.container == Container::Mov {
            args.extend_from_slice(&["-movflags".to_string(), "+faststart".to_string()]);
        }

        args
    }
}

/// Render a frame rate without a trailing `.0`.
pub fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 {
        format!("{}", rate as u64)
    } else {
        format!("{rate}")
    }
}
