//! Text card layout: each layer wrapped to the frame width and stacked
//! inside its band.

use std::sync::Arc;
use tracing::warn;
use tvid_models::{CaptionFrame, CaptionLine, TextCard};

use super::layout::CaptionCanvas;
use super::measure::TextMeasure;
use super::wrap::{words_with_breaks, wrap_words, WrapLimits};
use crate::error::{MediaError, MediaResult};

/// Horizontal margin on each side, and the first line's offset inside the band.
const CARD_PADDING: f32 = 10.0;
/// Extra space between card lines.
const CARD_LINE_GAP: f32 = 5.0;

/// Lay out every layer of `card` as a frame visible from 0 to `duration`.
///
/// Lines that would run past the bottom of their band are dropped.
pub fn layout_card(
    card: &TextCard,
    canvas: CaptionCanvas,
    duration: f64,
    measure_for: impl Fn(&str) -> Arc<dyn TextMeasure>,
) -> MediaResult<Vec<CaptionFrame>> {
    card.check().map_err(|e| MediaError::config(e.to_string()))?;

    let width = canvas.width as f32;
    let height = canvas.height as f32;
    let mut frames = Vec::with_capacity(card.layers.len());

    for (i, layer) in card.layers.iter().enumerate() {
        let measure = measure_for(&layer.font.family);
        let size = layer.font.size;
        let words = words_with_breaks(&layer.text);
        let limits = WrapLimits {
            max_chars: usize::MAX,
            max_lines: usize::MAX,
            max_width: (width - 2.0 * CARD_PADDING).max(1.0),
            size,
            measure: measure.as_ref(),
        };
        let wrapped = wrap_words(&words, &limits).unwrap_or_default();

        let band_top = height * layer.top + CARD_PADDING;
        let band_bottom = height * (layer.top + layer.height);
        let step = measure.line_height(size) + CARD_LINE_GAP;
        let ascent = measure.ascent(size);

        let mut lines = Vec::with_capacity(wrapped.len());
        for (row, text) in wrapped.iter().enumerate() {
            let top = band_top + row as f32 * step;
            if top + measure.line_height(size) > band_bottom {
                warn!(
                    layer = i,
                    dropped = wrapped.len() - row,
                    "Card text does not fit its band"
                );
                break;
            }
            let advance = measure.advance(text, size);
            lines.push(CaptionLine {
                text: text.clone(),
                x: ((width - advance) / 2.0).round() as i32,
                baseline_y: (top + ascent).round() as i32,
                width: advance.ceil().max(0.0) as u32,
            });
        }

        frames.push(CaptionFrame {
            index: i as u32,
            start: 0.0,
            end: duration,
            text: wrapped.join(" "),
            lines,
            style: layer.font.style(),
            low_confidence: false,
        });
    }

    Ok(frames)
}
