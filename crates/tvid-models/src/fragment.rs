//! Alignment output and alignment tuning.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ModelError, ModelResult};

/// A text span paired with the time interval it is spoken in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlignedFragment {
    /// Index of the source script segment
    pub segment_index: u32,
    /// Text span (a word, or a whole segment)
    pub text: String,
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds (always > start)
    pub end: f64,
    /// Alignment confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Timing came from the proportional fallback
    #[serde(default)]
    pub low_confidence: bool,
    /// The script breaks the line after this fragment
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub line_break: bool,
}

impl AlignedFragment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the half-open intervals of two fragments intersect.
    pub fn overlaps(&self, other: &AlignedFragment) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Check the fragment track invariant: starts non-decreasing, no overlap,
/// every fragment non-empty.
pub fn is_well_ordered(fragments: &[AlignedFragment]) -> bool {
    fragments.iter().all(|f| f.end > f.start)
        && fragments
            .windows(2)
            .all(|w| w[1].start >= w[0].start && w[1].start >= w[0].end)
}

/// Granularity of the fragments handed to caption layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentGranularity {
    /// One fragment per spoken word
    #[default]
    Word,
    /// One fragment per script segment
    Segment,
}

/// Alignment tuning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct AlignmentConfig {
    /// Fragment granularity
    #[serde(default)]
    pub granularity: AlignmentGranularity,

    /// Fragments below this confidence are re-timed proportionally
    #[serde(default = "default_confidence_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f32,

    /// Shortest plausible spoken word (seconds)
    #[serde(default = "default_min_word_duration")]
    #[validate(range(min = 0.0))]
    pub min_word_duration: f64,

    /// Shortest unvoiced run treated as a pause (seconds)
    #[serde(default = "default_min_pause")]
    #[validate(range(min = 0.0))]
    pub min_pause: f64,

    /// How far a segment boundary may move to land in a pause (seconds)
    #[serde(default = "default_snap_window")]
    #[validate(range(min = 0.0))]
    pub snap_window: f64,

    /// Length given to the last timepoint window (seconds)
    #[serde(default = "default_last_mark_duration")]
    #[validate(range(min = 0.0))]
    pub last_mark_duration: f64,
}

fn default_confidence_threshold() -> f32 {
    0.35
}
fn default_min_word_duration() -> f64 {
    0.12
}
fn default_min_pause() -> f64 {
    0.15
}
fn default_snap_window() -> f64 {
    0.35
}
fn default_last_mark_duration() -> f64 {
    2.5
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            granularity: AlignmentGranularity::default(),
            confidence_threshold: default_confidence_threshold(),
            min_word_duration: default_min_word_duration(),
            min_pause: default_min_pause(),
            snap_window: default_snap_window(),
            last_mark_duration: default_last_mark_duration(),
        }
    }
}

impl AlignmentConfig {
    /// Builder-style setter for the granularity.
    pub fn with_granularity(mut self, granularity: AlignmentGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Builder-style setter for the confidence threshold.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Validate all ranges.
    pub fn check(&self) -> ModelResult<()> {
        self.validate().map_err(ModelError::from)
    }
}
