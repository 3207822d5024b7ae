//! Caption configuration and derived caption frames.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::color::Color;
use crate::error::{ModelError, ModelResult};

/// Font selection and paint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct FontSpec {
    /// Font family (matched against installed font file names)
    #[serde(default = "default_family")]
    #[validate(length(min = 1))]
    pub family: String,

    /// Font size in pixels
    #[serde(default = "default_font_size")]
    pub size: f32,

    /// Fill color
    #[serde(default = "default_fill")]
    pub color: Color,

    /// Outline color (no outline when absent)
    #[serde(default = "default_outline")]
    pub outline_color: Option<Color>,

    /// Outline width in pixels
    #[serde(default = "default_outline_width")]
    #[validate(range(min = 0.0, max = 16.0))]
    pub outline_width: f32,

    /// Translucent box drawn behind the text block
    #[serde(default)]
    pub box_color: Option<Color>,
}

fn default_family() -> String {
    "DejaVu Sans Bold".to_string()
}
fn default_font_size() -> f32 {
    64.0
}
fn default_fill() -> Color {
    Color::WHITE
}
fn default_outline() -> Option<Color> {
    Some(Color::BLACK)
}
fn default_outline_width() -> f32 {
    3.0
}

impl FontSpec {
    /// Resolved paint for frames drawn with this font.
    pub fn style(&self) -> CaptionStyle {
        CaptionStyle {
            family: self.family.clone(),
            size: self.size,
            color: self.color,
            outline_color: self.outline_color,
            outline_width: self.outline_width,
            box_color: self.box_color,
        }
    }
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: default_family(),
            size: default_font_size(),
            color: default_fill(),
            outline_color: default_outline(),
            outline_width: default_outline_width(),
            box_color: None,
        }
    }
}

/// Margins reserved around captions, as fractions of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SafeArea {
    #[validate(range(min = 0.0, max = 0.49))]
    pub left: f32,
    #[validate(range(min = 0.0, max = 0.49))]
    pub right: f32,
    #[validate(range(min = 0.0, max = 0.49))]
    pub top: f32,
    #[validate(range(min = 0.0, max = 0.49))]
    pub bottom: f32,
}

impl Default for SafeArea {
    fn default() -> Self {
        Self {
            left: 0.05,
            right: 0.05,
            top: 0.1,
            bottom: 0.1,
        }
    }
}

impl SafeArea {
    /// Same margin on every side.
    pub fn uniform(fraction: f32) -> Self {
        Self {
            left: fraction,
            right: fraction,
            top: fraction,
            bottom: fraction,
        }
    }

    /// Pixel rectangle `(x, y, width, height)` inside a `width × height` frame.
    pub fn rect(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x0 = (width as f32 * self.left).round() as u32;
        let x1 = width - (width as f32 * self.right).round() as u32;
        let y0 = (height as f32 * self.top).round() as u32;
        let y1 = height - (height as f32 * self.bottom).round() as u32;
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

/// Vertical placement of the caption block inside the safe area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAnchor {
    Top,
    #[default]
    Center,
    Bottom,
}

/// Caption layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CaptionConfig {
    /// Character budget per caption line
    #[serde(default = "default_max_chars_per_line")]
    #[validate(range(min = 1))]
    pub max_chars_per_line: u32,

    /// Maximum lines per caption
    #[serde(default = "default_max_lines")]
    #[validate(range(min = 1))]
    pub max_lines: u32,

    /// Font and paint
    #[serde(default)]
    #[validate(nested)]
    pub font: FontSpec,

    /// Margins guarding the frame edges
    #[serde(default)]
    #[validate(nested)]
    pub safe_area: SafeArea,

    /// Vertical anchor of the caption block
    #[serde(default)]
    pub anchor: VerticalAnchor,

    /// Line height as a multiple of the font's natural line height
    #[serde(default = "default_line_spacing")]
    #[validate(range(min = 0.5, max = 3.0))]
    pub line_spacing: f32,

    /// Silence longer than this starts a new caption (seconds)
    #[serde(default = "default_max_gap")]
    #[validate(range(min = 0.0))]
    pub max_gap: f64,

    /// How long a caption may stay up into following silence (seconds)
    #[serde(default = "default_linger")]
    #[validate(range(min = 0.0))]
    pub linger: f64,

    /// Start a new caption at every script segment
    #[serde(default = "default_segment_breaks")]
    pub segment_breaks: bool,
}

fn default_max_chars_per_line() -> u32 {
    24
}
fn default_max_lines() -> u32 {
    2
}
fn default_line_spacing() -> f32 {
    1.15
}
fn default_max_gap() -> f64 {
    1.0
}
fn default_linger() -> f64 {
    0.3
}
fn default_segment_breaks() -> bool {
    true
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            max_chars_per_line: default_max_chars_per_line(),
            max_lines: default_max_lines(),
            font: FontSpec::default(),
            safe_area: SafeArea::default(),
            anchor: VerticalAnchor::default(),
            line_spacing: default_line_spacing(),
            max_gap: default_max_gap(),
            linger: default_linger(),
            segment_breaks: default_segment_breaks(),
        }
    }
}

impl CaptionConfig {
    /// Builder-style setter for the character budget.
    pub fn with_budget(mut self, max_chars_per_line: u32, max_lines: u32) -> Self {
        self.max_chars_per_line = max_chars_per_line;
        self.max_lines = max_lines;
        self
    }

    /// Builder-style setter for the font.
    pub fn with_font(mut self, font: FontSpec) -> Self {
        self.font = font;
        self
    }

    /// Total characters a single caption may show.
    pub fn char_budget(&self) -> usize {
        self.max_chars_per_line as usize * self.max_lines as usize
    }

    /// Validate every option before any frame is produced.
    pub fn check(&self) -> ModelResult<()> {
        self.validate()?;
        if !self.font.size.is_finite() || self.font.size <= 0.0 {
            return Err(ModelError::invalid_config(format!(
                "font size must be positive, got {}",
                self.font.size
            )));
        }
        Ok(())
    }

    /// Style snapshot stamped onto every caption frame.
    pub fn style(&self) -> CaptionStyle {
        self.font.style()
    }
}

/// Resolved paint of a caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionStyle {
    pub family: String,
    pub size: f32,
    pub color: Color,
    pub outline_color: Option<Color>,
    pub outline_width: f32,
    pub box_color: Option<Color>,
}

/// One laid-out caption line in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionLine {
    pub text: String,
    /// Left edge of the pen
    pub x: i32,
    /// Baseline
    pub baseline_y: i32,
    /// Advance width of the line
    pub width: u32,
}

/// A rendering instruction for one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionFrame {
    /// Position in the caption sequence
    pub index: u32,
    /// Window start (inclusive), seconds
    pub start: f64,
    /// Window end (exclusive), seconds
    pub end: f64,
    /// Visible text, lines joined with a space
    pub text: String,
    /// Wrapped and positioned lines
    pub lines: Vec<CaptionLine>,
    /// Paint
    pub style: CaptionStyle,
    /// Built from low-confidence fragments
    #[serde(default)]
    pub low_confidence: bool,
}

impl CaptionFrame {
    /// Whether time `t` falls inside the window.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Characters shown, excluding line breaks.
    pub fn char_count(&self) -> usize {
        self.lines.iter().map(|l| l.text.chars().count()).sum()
    }
}
