//! Text cards: static, separately styled text layers shown for the whole video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::caption::FontSpec;
use crate::color::Color;
use crate::error::{ModelError, ModelResult};

/// One block of card text, laid out inside a horizontal band of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CardLayer {
    /// Text; `\n` forces a line break
    #[validate(length(min = 1))]
    pub text: String,

    /// Font and paint
    #[serde(default)]
    #[validate(nested)]
    pub font: FontSpec,

    /// Top of the band, as a fraction of the frame height
    #[validate(range(min = 0.0, max = 1.0))]
    pub top: f32,

    /// Height of the band, as a fraction of the frame height
    #[validate(range(min = 0.0, max = 1.0))]
    pub height: f32,
}

impl CardLayer {
    pub fn new(text: impl Into<String>, font: FontSpec, top: f32, height: f32) -> Self {
        Self {
            text: text.into(),
            font,
            top,
            height,
        }
    }
}

/// Layers drawn over the background, in order, below the captions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextCard {
    pub layers: Vec<CardLayer>,
}

impl TextCard {
    /// Question, choices and answer, placed for a 1080-pixel-high frame.
    /// The answer is painted green.
    pub fn trivia(question: &str, choices: &str, answer: &str) -> Self {
        let font = |size: f32, color: Color| FontSpec {
            size,
            color,
            outline_color: None,
            ..FontSpec::default()
        };
        let band = |px: f32| px / 1080.0;

        Self {
            layers: vec![
                CardLayer::new(question, font(70.0, Color::WHITE), band(50.0), band(300.0)),
                CardLayer::new(choices, font(50.0, Color::WHITE), band(400.0), band(400.0)),
                CardLayer::new(
                    format!("✅ {answer}"),
                    font(60.0, Color::rgb(0, 128, 0)),
                    band(800.0),
                    band(200.0),
                ),
            ],
        }
    }

    pub fn check(&self) -> ModelResult<()> {
        if self.layers.is_empty() {
            return Err(ModelError::invalid_config("text card has no layers"));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate()?;
            if layer.text.trim().is_empty() {
                return Err(ModelError::invalid_config(format!("card layer {i} has no text")));
            }
            if !layer.font.size.is_finite() || layer.font.size <= 0.0 {
                return Err(ModelError::invalid_config(format!(
                    "card layer {i}: font size must be positive, got {}",
                    layer.font.size
                )));
            }
            if layer.height <= 0.0 || layer.top + layer.height > 1.0 + 1e-4 {
                return Err(ModelError::invalid_config(format!(
                    "card layer {i}: band {}+{} does not fit the frame",
                    layer.top, layer.height
                )));
            }
        }
        Ok(())
    }
}
