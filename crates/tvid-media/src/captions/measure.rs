//! Text measurement seam used by wrapping and placement.

/// Pixel metrics of a font at a given size.
pub trait TextMeasure: Send + Sync {
    /// Advance width of `text` in pixels.
    fn advance(&self, text: &str, size: f32) -> f32;

    /// Distance between consecutive baselines.
    fn line_height(&self, size: f32) -> f32;

    /// Height above the baseline.
    fn ascent(&self, size: f32) -> f32;
}

/// Every character advances by the same fraction of the font size.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvance {
    pub advance_ratio: f32,
}

impl Default for FixedAdvance {
    fn default() -> Self {
        Self { advance_ratio: 0.6 }
    }
}

impl TextMeasure for FixedAdvance {
    fn advance(&self, text: &str, size: f32) -> f32 {
        text.chars().count() as f32 * size * self.advance_ratio
    }

    fn line_height(&self, size: f32) -> f32 {
        size * 1.2
    }

    fn ascent(&self, size: f32) -> f32 {
        size * 0.8
    }
}
