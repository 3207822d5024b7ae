//! Narration script segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// One ordered unit of narration text supplied by the caller.
///
/// Segments are immutable once a job has been submitted; the alignment
/// engine only ever reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptSegment {
    /// Sequence index, strictly increasing within a script
    pub index: u32,
    /// Raw text as spoken (line breaks allowed)
    pub text: String,
    /// Optional explicit duration hint in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hint: Option<f64>,
}

impl ScriptSegment {
    pub fn new(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            duration_hint: None,
        }
    }

    /// Builder-style setter for the duration hint.
    pub fn with_duration_hint(mut self, seconds: f64) -> Self {
        self.duration_hint = Some(seconds);
        self
    }

    /// Build a script from plain pages, numbering them from zero.
    pub fn sequence<I, S>(pages: I) -> Vec<ScriptSegment>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| ScriptSegment::new(i as u32, text))
            .collect()
    }

    /// Whitespace-separated words of the segment.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.text.split_whitespace()
    }

    /// Text with all whitespace runs (including line breaks) collapsed.
    pub fn normalized_text(&self) -> String {
        self.words().collect::<Vec<_>>().join(" ")
    }
}

/// Validate an ordered script.
///
/// Checks:
/// - At least one segment
/// - Sequence indices strictly increasing
/// - Concatenated text is non-empty
/// - Duration hints, when present, are positive and finite
pub fn validate_script(segments: &[ScriptSegment]) -> ModelResult<()> {
    if segments.is_empty() {
        return Err(ModelError::invalid_script("script has no segments"));
    }

    for pair in segments.windows(2) {
        if pair[1].index <= pair[0].index {
            return Err(ModelError::invalid_script(format!(
                "segment {} follows segment {} out of order",
                pair[1].index, pair[0].index
            )));
        }
    }

    if segments.iter().all(|s| s.words().next().is_none()) {
        return Err(ModelError::invalid_script("script text is empty"));
    }

    for segment in segments {
        if let Some(hint) = segment.duration_hint {
            if !hint.is_finite() || hint <= 0.0 {
                return Err(ModelError::invalid_script(format!(
                    "segment {} has invalid duration hint {}",
                    segment.index, hint
                )));
            }
        }
    }

    Ok(())
}

/// Total number of words across the script.
pub fn word_count(segments: &[ScriptSegment]) -> usize {
    segments.iter().map(|s| s.words().count()).sum()
}
