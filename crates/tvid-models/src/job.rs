//! Render job definitions and the job status machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

use crate::caption::CaptionConfig;
use crate::card::TextCard;
use crate::color::Color;
use crate::encoding::OutputSpec;
use crate::error::{ModelError, ModelResult};
use crate::fragment::AlignmentConfig;
use crate::script::{validate_script, ScriptSegment};

/// Default tolerated audio/video duration mismatch (seconds).
pub const DEFAULT_MAX_AV_DRIFT: f64 = 0.25;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// URL scheme of an object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectScheme {
    #[default]
    S3,
    Gs,
    R2,
}

impl ObjectScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectScheme::S3 => "s3",
            ObjectScheme::Gs => "gs",
            ObjectScheme::R2 => "r2",
        }
    }

    fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "s3" => Some(ObjectScheme::S3),
            "gs" => Some(ObjectScheme::Gs),
            "r2" => Some(ObjectScheme::R2),
            _ => None,
        }
    }
}

/// Location of an input or output asset.
///
/// Serialized as a string: a filesystem path, a `file://` URL, or an object
/// URL with scheme `s3`, `gs` or `r2` (`gs://bucket/path/to/key`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetRef {
    Local(PathBuf),
    Object {
        scheme: ObjectScheme,
        bucket: String,
        key: String,
    },
}

impl AssetRef {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(path.into())
    }

    /// Object reference with the `s3` scheme.
    pub fn object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::object_with_scheme(ObjectScheme::S3, bucket, key)
    }

    pub fn object_with_scheme(
        scheme: ObjectScheme,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::Object {
            scheme,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn as_local(&self) -> Option<&Path> {
        match self {
            AssetRef::Local(path) => Some(path),
            AssetRef::Object { .. } => None,
        }
    }

    /// Final path component, used to name downloaded copies.
    pub fn file_name(&self) -> Option<String> {
        match self {
            AssetRef::Local(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            AssetRef::Object { key, .. } => key.rsplit('/').next().filter(|s| !s.is_empty()).map(String::from),
        }
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.file_name()
            .and_then(|n| n.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
    }
}

impl FromStr for AssetRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ModelError::invalid_asset(s, "empty reference"));
        }

        if !trimmed.contains("://") {
            return Ok(AssetRef::Local(PathBuf::from(trimmed)));
        }

        let url = Url::parse(trimmed).map_err(|e| ModelError::invalid_asset(s, e.to_string()))?;
        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(AssetRef::Local)
                .map_err(|_| ModelError::invalid_asset(s, "not an absolute file path")),
            scheme => {
                let scheme = ObjectScheme::parse(scheme).ok_or_else(|| {
                    ModelError::invalid_asset(s, format!("unsupported scheme '{scheme}'"))
                })?;
                let bucket = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| ModelError::invalid_asset(s, "missing bucket"))?;
                let key = url.path().trim_start_matches('/');
                if key.is_empty() {
                    return Err(ModelError::invalid_asset(s, "missing object key"));
                }
                Ok(AssetRef::object_with_scheme(scheme, bucket, key))
            }
        }
    }
}

impl TryFrom<String> for AssetRef {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssetRef> for String {
    fn from(value: AssetRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetRef::Local(path) => write!(f, "{}", path.display()),
            AssetRef::Object {
                scheme,
                bucket,
                key,
            } => write!(f, "{}://{bucket}/{key}", scheme.as_str()),
        }
    }
}

impl JsonSchema for AssetRef {
    fn schema_name() -> String {
        "AssetRef".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

/// Background visual behind the captions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundSpec {
    /// Solid fill
    Color { color: Color },
    /// Still image, cover-scaled to the output resolution
    Image { source: AssetRef },
    /// Images shown in order, each for a fixed time
    Slideshow {
        sources: Vec<AssetRef>,
        #[serde(default = "default_seconds_per_slide")]
        seconds_per_slide: f64,
    },
    /// Video clip, decoded at the output size and rate
    Video { source: AssetRef },
}

fn default_seconds_per_slide() -> f64 {
    3.0
}

impl Default for BackgroundSpec {
    fn default() -> Self {
        BackgroundSpec::Color {
            color: Color::BLACK,
        }
    }
}

impl BackgroundSpec {
    /// Every asset the background reads.
    pub fn assets(&self) -> Vec<&AssetRef> {
        match self {
            BackgroundSpec::Color { .. } => Vec::new(),
            BackgroundSpec::Image { source } | BackgroundSpec::Video { source } => vec![source],
            BackgroundSpec::Slideshow { sources, .. } => sources.iter().collect(),
        }
    }

    fn check(&self) -> ModelResult<()> {
        if let BackgroundSpec::Slideshow {
            sources,
            seconds_per_slide,
        } = self
        {
            if sources.is_empty() {
                return Err(ModelError::invalid_config("slideshow needs at least one image"));
            }
            if !seconds_per_slide.is_finite() || *seconds_per_slide <= 0.0 {
                return Err(ModelError::invalid_config(format!(
                    "seconds_per_slide must be positive, got {seconds_per_slide}"
                )));
            }
        }
        Ok(())
    }
}

/// What the background does once its own duration runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundFit {
    /// Hold the last frame
    #[default]
    Hold,
    /// Start over from the beginning
    Loop,
}

/// Failure category reported for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Alignment,
    Render,
    Sync,
    Encode,
    Cancelled,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Alignment => "alignment",
            ErrorKind::Render => "render",
            ErrorKind::Sync => "sync",
            ErrorKind::Encode => "encode",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Render job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, nothing started
    #[default]
    Pending,
    /// Decoding audio and aligning the script
    Aligning,
    /// Laying out captions and compositing frames
    Compositing,
    /// Encoding and muxing
    Assembling,
    /// Artifact delivered
    Done,
    /// Stopped with an error
    Failed(ErrorKind),
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Aligning => "aligning",
            JobStatus::Compositing => "compositing",
            JobStatus::Assembling => "assembling",
            JobStatus::Done => "done",
            JobStatus::Failed(_) => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed(_))
    }

    /// Stages advance one at a time; any live state may fail.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Aligning)
            | (Aligning, Compositing)
            | (Compositing, Assembling)
            | (Assembling, Done) => true,
            (from, Failed(_)) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Validated transition.
    pub fn transition(self, next: JobStatus) -> ModelResult<JobStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ModelError::IllegalTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Failed(kind) => write!(f, "failed({kind})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// One narrated-caption render.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderJob {
    /// Unique job ID
    #[serde(default)]
    pub id: JobId,

    /// Narration script, in speaking order
    pub segments: Vec<ScriptSegment>,

    /// Narration audio
    pub audio: AssetRef,

    /// Per-segment start offsets reported by the speech synthesizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timepoints: Option<Vec<f64>>,

    /// Background visual
    #[serde(default)]
    pub background: BackgroundSpec,

    /// Behaviour when the background is shorter than the narration
    #[serde(default)]
    pub background_fit: BackgroundFit,

    /// Output location (defaults to `videos/<id>.<ext>` in the default bucket)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<AssetRef>,

    /// Encoding parameters
    #[serde(default)]
    pub output_spec: OutputSpec,

    /// Caption overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions: Option<CaptionConfig>,

    /// Static text layers over the background
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<TextCard>,

    /// Alignment overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentConfig>,

    /// Tolerated audio/video duration mismatch (seconds)
    #[serde(default = "default_max_av_drift")]
    pub max_av_drift: f64,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_max_av_drift() -> f64 {
    DEFAULT_MAX_AV_DRIFT
}

impl RenderJob {
    /// Create a job with default background, captions and encoding.
    pub fn new(segments: Vec<ScriptSegment>, audio: AssetRef) -> Self {
        Self {
            id: JobId::new(),
            segments,
            audio,
            timepoints: None,
            background: BackgroundSpec::default(),
            background_fit: BackgroundFit::default(),
            output: None,
            output_spec: OutputSpec::default(),
            captions: None,
            card: None,
            alignment: None,
            max_av_drift: DEFAULT_MAX_AV_DRIFT,
            created_at: Utc::now(),
        }
    }

    pub fn with_background(mut self, background: BackgroundSpec, fit: BackgroundFit) -> Self {
        self.background = background;
        self.background_fit = fit;
        self
    }

    pub fn with_output(mut self, output: AssetRef) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_output_spec(mut self, spec: OutputSpec) -> Self {
        self.output_spec = spec;
        self
    }

    pub fn with_captions(mut self, captions: CaptionConfig) -> Self {
        self.captions = Some(captions);
        self
    }

    pub fn with_card(mut self, card: TextCard) -> Self {
        self.card = Some(card);
        self
    }

    pub fn with_timepoints(mut self, timepoints: Vec<f64>) -> Self {
        self.timepoints = Some(timepoints);
        self
    }

    /// Caption config in effect.
    pub fn caption_config(&self) -> CaptionConfig {
        self.captions.clone().unwrap_or_default()
    }

    /// Alignment config in effect.
    pub fn alignment_config(&self) -> AlignmentConfig {
        self.alignment.clone().unwrap_or_default()
    }

    /// Generated object key when no output is given.
    pub fn default_output_key(&self) -> String {
        format!("videos/{}.{}", self.id, self.output_spec.container.extension())
    }

    /// Reject anything that would fail before resources are acquired.
    ///
    /// Timepoint ordering against the audio is checked during alignment, once
    /// the audio duration is known.
    pub fn validate(&self) -> ModelResult<()> {
        validate_script(&self.segments)?;
        self.output_spec.validate()?;
        self.caption_config().check()?;
        self.alignment_config().check()?;
        self.background.check()?;
        if let Some(card) = &self.card {
            card.check()?;
        }

        if !self.max_av_drift.is_finite() || self.max_av_drift < 0.0 {
            return Err(ModelError::invalid_config(format!(
                "max_av_drift must be non-negative, got {}",
                self.max_av_drift
            )));
        }

        if let Some(timepoints) = &self.timepoints {
            if timepoints.len() != self.segments.len() {
                return Err(ModelError::invalid_config(format!(
                    "expected {} timepoints, got {}",
                    self.segments.len(),
                    timepoints.len()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> RenderJob {
        RenderJob::new(
            ScriptSegment::sequence(["Welcome", "to the quiz"]),
            AssetRef::local("/tmp/narration.wav"),
        )
    }

    #[test]
    fn test_asset_ref_parsing() {
        assert_eq!(
            "gs://trivia-videos-output/videos/a.mp4".parse::<AssetRef>().unwrap(),
            AssetRef::object_with_scheme(ObjectScheme::Gs, "trivia-videos-output", "videos/a.mp4")
        );
        assert_eq!(
            "/data/bg.png".parse::<AssetRef>().unwrap(),
            AssetRef::local("/data/bg.png")
        );
        assert_eq!(
            "file:///data/bg.png".parse::<AssetRef>().unwrap(),
            AssetRef::local("/data/bg.png")
        );
        assert!("s3://bucket".parse::<AssetRef>().is_err());
        assert!("ftp://host/file".parse::<AssetRef>().is_err());
        assert!("".parse::<AssetRef>().is_err());
    }

    #[test]
    fn test_object_scheme_survives_display() {
        for url in ["gs://media/videos/a.mp4", "r2://media/a.srt", "s3://media/voice.wav"] {
            let asset: AssetRef = url.parse().unwrap();
            assert_eq!(asset.to_string(), url);
        }
        let json = serde_json::to_string(&AssetRef::object_with_scheme(ObjectScheme::R2, "b", "k.mp4"))
            .unwrap();
        assert_eq!(json, r#""r2://b/k.mp4""#);
    }

    #[test]
    fn test_asset_ref_extension() {
        let asset = AssetRef::object("b", "audio/Intro.WAV");
        assert_eq!(asset.file_name().as_deref(), Some("Intro.WAV"));
        assert_eq!(asset.extension().as_deref(), Some("wav"));
    }

    #[test]
    fn test_status_transitions() {
        let status = JobStatus::Pending;
        let status = status.transition(JobStatus::Aligning).unwrap();
        let status = status.transition(JobStatus::Compositing).unwrap();
        assert!(status.transition(JobStatus::Done).is_err());
        let failed = status.transition(JobStatus::Failed(ErrorKind::Render)).unwrap();
        assert!(failed.is_terminal());
        assert!(failed.transition(JobStatus::Failed(ErrorKind::Sync)).is_err());
        assert_eq!(failed.to_string(), "failed(render)");
    }

    #[test]
    fn test_job_json_defaults() {
        let json = r#"{
            "segments": [{"index": 0, "text": "Welcome"}],
            "audio": "gs://tts/narration.wav",
            "background": {"kind": "image", "source": "/data/bg.png"}
        }"#;
        let job: RenderJob = serde_json::from_str(json).unwrap();
        assert_eq!(
            job.audio,
            AssetRef::object_with_scheme(ObjectScheme::Gs, "tts", "narration.wav")
        );
        assert_eq!(job.background_fit, BackgroundFit::Hold);
        assert!(job.validate().is_ok());
        assert!(job.default_output_key().starts_with("videos/"));
        assert!(job.default_output_key().ends_with(".mp4"));
    }

    #[test]
    fn test_timepoint_count_mismatch() {
        let job = job().with_timepoints(vec![0.0]);
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_invalid_card_fails_validation() {
        let mut card = TextCard::trivia("Capital of France?", "A: Berlin\nB: Paris", "Paris");
        assert!(job().with_card(card.clone()).validate().is_ok());

        card.layers[0].font.size = 0.0;
        assert!(job().with_card(card).validate().is_err());
    }

    #[test]
    fn test_empty_slideshow_rejected() {
        let job = job().with_background(
            BackgroundSpec::Slideshow {
                sources: vec![],
                seconds_per_slide: 2.0,
            },
            BackgroundFit::Loop,
        );
        assert!(job.validate().is_err());
    }
}
