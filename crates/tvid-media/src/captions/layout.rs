//! Caption grouping, timing and placement.

use std::sync::Arc;
use tvid_models::timestamp::format_srt_timestamp;
use tvid_models::{
    AlignedFragment, CaptionConfig, CaptionFrame, CaptionLine, CaptionStyle, Resolution,
    VerticalAnchor,
};

use super::measure::TextMeasure;
use super::wrap::{hard_break, words_with_breaks, wrap_words, WrapLimits, LINE_BREAK};
use crate::error::{MediaError, MediaResult};

/// Frame geometry and timing captions are laid out for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionCanvas {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl CaptionCanvas {
    pub fn new(resolution: Resolution, frame_rate: f64) -> Self {
        Self {
            width: resolution.width,
            height: resolution.height,
            frame_rate,
        }
    }

    /// One rendering tick in seconds.
    pub fn tick(&self) -> f64 {
        1.0 / self.frame_rate
    }
}

/// A word (or a piece of a hard-broken word) with its timing.
#[derive(Debug, Clone)]
struct Token {
    text: String,
    start: f64,
    end: f64,
    segment_index: u32,
    low_confidence: bool,
    sentence_end: bool,
    /// Author line break after this token
    line_break: bool,
}

#[derive(Clone)]
struct LayoutInner {
    tokens: Vec<Token>,
    config: CaptionConfig,
    canvas: CaptionCanvas,
    measure: Arc<dyn TextMeasure>,
    style: CaptionStyle,
    time_limit: Option<f64>,
}

/// Laid-out captions; cheap to clone, frames are produced on demand.
#[derive(Clone)]
pub struct CaptionLayout {
    inner: Arc<LayoutInner>,
}

impl std::fmt::Debug for CaptionLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionLayout")
            .field("tokens", &self.inner.tokens.len())
            .field("canvas", &self.inner.canvas)
            .finish()
    }
}

/// Build a caption layout for aligned fragments.
pub fn layout(
    fragments: &[AlignedFragment],
    config: CaptionConfig,
    canvas: CaptionCanvas,
    measure: Arc<dyn TextMeasure>,
) -> MediaResult<CaptionLayout> {
    CaptionLayout::new(fragments, config, canvas, measure)
}

impl CaptionLayout {
    /// Validate the config and tokenize the fragments. No frame is built yet.
    pub fn new(
        fragments: &[AlignedFragment],
        config: CaptionConfig,
        canvas: CaptionCanvas,
        measure: Arc<dyn TextMeasure>,
    ) -> MediaResult<Self> {
        config.check().map_err(|e| MediaError::config(e.to_string()))?;
        if canvas.width == 0 || canvas.height == 0 {
            return Err(MediaError::config(format!(
                "caption canvas must be non-empty, got {}x{}",
                canvas.width, canvas.height
            )));
        }
        if !canvas.frame_rate.is_finite() || canvas.frame_rate <= 0.0 {
            return Err(MediaError::config(format!(
                "frame rate must be positive, got {}",
                canvas.frame_rate
            )));
        }

        let tokens = tokenize(fragments, config.max_chars_per_line as usize);
        let style = config.style();

        Ok(Self {
            inner: Arc::new(LayoutInner {
                tokens,
                config,
                canvas,
                measure,
                style,
                time_limit: None,
            }),
        })
    }

    /// Never let a caption run past `limit` seconds.
    pub fn with_time_limit(mut self, limit: f64) -> Self {
        Arc::make_mut(&mut self.inner).time_limit = Some(limit);
        self
    }

    pub fn canvas(&self) -> CaptionCanvas {
        self.inner.canvas
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.inner.config
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tokens.is_empty()
    }

    /// Lazy caption sequence; every call starts from the first caption.
    pub fn frames(&self) -> CaptionFrames {
        CaptionFrames {
            inner: Arc::clone(&self.inner),
            cursor: 0,
            index: 0,
        }
    }

    /// Render the captions as an SRT document.
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, frame) in self.frames().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n",
                i + 1,
                format_srt_timestamp(frame.start),
                format_srt_timestamp(frame.end)
            ));
            for line in &frame.lines {
                out.push_str(&line.text);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

/// Iterator over caption frames.
pub struct CaptionFrames {
    inner: Arc<LayoutInner>,
    cursor: usize,
    index: u32,
}

impl Iterator for CaptionFrames {
    type Item = CaptionFrame;

    fn next(&mut self) -> Option<CaptionFrame> {
        let inner = &self.inner;
        let tokens = &inner.tokens;
        if self.cursor >= tokens.len() {
            return None;
        }

        let first = self.cursor;
        let start = tokens[first].start;
        if inner.time_limit.is_some_and(|limit| start >= limit) {
            self.cursor = tokens.len();
            return None;
        }

        let (next, lines) = inner.next_group(first);
        let group = &tokens[first..next];

        let speech_end = group.iter().map(|t| t.end).fold(start, f64::max);
        let mut end = speech_end + inner.config.linger;
        if let Some(limit) = inner.time_limit {
            end = end.min(limit);
        }
        if let Some(following) = tokens.get(next) {
            let clip = following.start - inner.canvas.tick();
            if end > clip {
                end = if clip > start { clip } else { following.start };
            }
        }
        if end <= start {
            end = start + inner.canvas.tick();
        }

        let frame = CaptionFrame {
            index: self.index,
            start,
            end,
            text: lines.join(" "),
            lines: inner.place(&lines),
            style: inner.style.clone(),
            low_confidence: group.iter().any(|t| t.low_confidence),
        };

        self.cursor = next;
        self.index += 1;
        Some(frame)
    }
}

impl LayoutInner {
    fn limits(&self) -> WrapLimits<'_> {
        let (_, _, width, _) = self
            .config
            .safe_area
            .rect(self.canvas.width, self.canvas.height);
        WrapLimits {
            max_chars: self.config.max_chars_per_line as usize,
            max_lines: self.config.max_lines as usize,
            max_width: width as f32,
            size: self.config.font.size,
            measure: self.measure.as_ref(),
        }
    }

    /// Grow a group from `first` until a forced boundary or the budget.
    /// Returns the exclusive end index and the wrapped lines.
    fn next_group(&self, first: usize) -> (usize, Vec<String>) {
        let tokens = &self.tokens;
        let limits = self.limits();

        let mut words: Vec<&str> = vec![tokens[first].text.as_str()];
        let mut lines =
            wrap_words(&words, &limits).unwrap_or_else(|| vec![tokens[first].text.clone()]);
        let mut next = first + 1;

        while next < tokens.len() {
            let prev = &tokens[next - 1];
            let token = &tokens[next];

            if prev.sentence_end || token.start - prev.end > self.config.max_gap {
                break;
            }
            if prev.segment_index != token.segment_index
                && (self.config.segment_breaks || prev.low_confidence || token.low_confidence)
            {
                break;
            }

            if prev.line_break {
                words.push(LINE_BREAK);
            }
            words.push(token.text.as_str());
            match wrap_words(&words, &limits) {
                Some(wrapped) => {
                    lines = wrapped;
                    next += 1;
                }
                None => break,
            }
        }

        (next, lines)
    }

    /// Center each line horizontally inside the safe area and stack the
    /// block at the configured anchor.
    fn place(&self, lines: &[String]) -> Vec<CaptionLine> {
        let (x0, y0, width, height) = self
            .config
            .safe_area
            .rect(self.canvas.width, self.canvas.height);
        let size = self.config.font.size;
        let line_height = self.measure.line_height(size) * self.config.line_spacing;
        let ascent = self.measure.ascent(size);
        let block = line_height * lines.len() as f32;

        let top = match self.config.anchor {
            VerticalAnchor::Top => y0 as f32,
            VerticalAnchor::Center => y0 as f32 + (height as f32 - block) / 2.0,
            VerticalAnchor::Bottom => y0 as f32 + height as f32 - block,
        };

        lines
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let advance = self.measure.advance(text, size);
                let x = x0 as f32 + (width as f32 - advance) / 2.0;
                CaptionLine {
                    text: text.clone(),
                    x: x.round() as i32,
                    baseline_y: (top + i as f32 * line_height + ascent).round() as i32,
                    width: advance.ceil().max(0.0) as u32,
                }
            })
            .collect()
    }
}

fn ends_sentence(word: &str) -> bool {
    let trimmed = word.trim_end_matches(|c: char| c == '"' || c == '\'' || c == ')' || c == '”');
    matches!(trimmed.chars().last(), Some('.' | '!' | '?' | '…'))
}

/// Split fragments into word tokens, sharing a phrase's time by character
/// count and hard-breaking words longer than a line. Author line breaks
/// stay attached to the word before them.
fn tokenize(fragments: &[AlignedFragment], max_chars: usize) -> Vec<Token> {
    let mut tokens = Vec::new();

    for fragment in fragments {
        // (text, sentence_end, line_break)
        let mut pieces: Vec<(String, bool, bool)> = Vec::new();
        for word in words_with_breaks(&fragment.text) {
            if word == LINE_BREAK {
                if let Some(last) = pieces.last_mut() {
                    last.2 = true;
                }
                continue;
            }
            let parts = hard_break(word, max_chars);
            let last = parts.len() - 1;
            let sentence_end = ends_sentence(word);
            pieces.extend(
                parts
                    .into_iter()
                    .enumerate()
                    .map(|(i, part)| (part, sentence_end && i == last, false)),
            );
        }
        let Some(last) = pieces.last_mut() else {
            continue;
        };
        last.2 |= fragment.line_break;

        let total: f64 = pieces
            .iter()
            .map(|(p, _, _)| p.chars().count().max(1) as f64)
            .sum();
        let span = fragment.end - fragment.start;

        let mut cumulative = 0.0;
        for (text, sentence_end, line_break) in pieces {
            let weight = text.chars().count().max(1) as f64;
            let start = fragment.start + span * cumulative / total;
            cumulative += weight;
            let end = fragment.start + span * cumulative / total;
            tokens.push(Token {
                text,
                start,
                end,
                segment_index: fragment.segment_index,
                low_confidence: fragment.low_confidence,
                sentence_end,
                line_break,
            });
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::measure::FixedAdvance;

    fn fragment(segment: u32, text: &str, start: f64, end: f64) -> AlignedFragment {
        AlignedFragment {
            segment_index: segment,
            text: text.to_string(),
            start,
            end,
            confidence: 0.9,
            low_confidence: false,
            line_break: false,
        }
    }

    fn quiz_fragments() -> Vec<AlignedFragment> {
        vec![
            fragment(0, "Welcome", 0.1, 1.0),
            fragment(1, "to the quiz", 1.4, 2.6),
            fragment(2, "let's begin", 3.0, 4.3),
        ]
    }

    fn canvas() -> CaptionCanvas {
        CaptionCanvas::new(Resolution::new(1280, 720), 30.0)
    }

    fn build(fragments: &[AlignedFragment], config: CaptionConfig) -> CaptionLayout {
        layout(fragments, config, canvas(), Arc::new(FixedAdvance::default())).unwrap()
    }

    fn assert_no_overlap(frames: &[CaptionFrame]) {
        for pair in frames.windows(2) {
            assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
        for frame in frames {
            assert!(frame.end > frame.start);
        }
    }

    #[test]
    fn test_one_caption_per_segment() {
        let config = CaptionConfig::default().with_budget(20, 1);
        let frames: Vec<_> = build(&quiz_fragments(), config).frames().collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].text, "Welcome");
        assert_eq!(frames[1].text, "to the quiz");
        assert_eq!(frames[2].text, "let's begin");
        assert_no_overlap(&frames);

        // linger into the gap after "Welcome"
        assert!((frames[0].end - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_regrouping_across_segments() {
        let mut config = CaptionConfig::default().with_budget(20, 1);
        config.segment_breaks = false;
        let frames: Vec<_> = build(&quiz_fragments(), config).frames().collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].text, "Welcome to the quiz");
        assert_no_overlap(&frames);
    }

    #[test]
    fn test_low_confidence_blocks_regrouping() {
        let mut config = CaptionConfig::default().with_budget(20, 1);
        config.segment_breaks = false;
        let mut fragments = quiz_fragments();
        fragments[1].low_confidence = true;

        let frames: Vec<_> = build(&fragments, config).frames().collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[1].low_confidence);
    }

    #[test]
    fn test_budget_respected() {
        let words = "the quick brown fox jumps over the lazy dog while everyone watches in silence";
        let fragments: Vec<_> = words
            .split(' ')
            .enumerate()
            .map(|(i, w)| fragment(0, w, i as f64 * 0.3, i as f64 * 0.3 + 0.25))
            .collect();

        let config = CaptionConfig::default().with_budget(12, 2);
        let frames: Vec<_> = build(&fragments, config).frames().collect();

        assert!(frames.len() > 1);
        assert_no_overlap(&frames);
        for frame in &frames {
            assert!(frame.lines.len() <= 2);
            assert!(frame.lines.iter().all(|l| l.text.chars().count() <= 12));
        }
        let rebuilt: Vec<&str> = frames.iter().flat_map(|f| f.text.split(' ')).collect();
        assert_eq!(rebuilt.join(" "), words);
    }

    #[test]
    fn test_sentence_end_forces_boundary() {
        let fragments = vec![
            fragment(0, "Ready.", 0.0, 0.5),
            fragment(0, "Go", 0.5, 1.0),
        ];
        let frames: Vec<_> = build(&fragments, CaptionConfig::default()).frames().collect();
        assert_eq!(frames.len(), 2);
        // clipped one tick before the next caption
        assert!((frames[0].end - (0.5 - 1.0 / 30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_linger_clipped_by_next_caption() {
        let fragments = vec![
            fragment(0, "Welcome", 0.0, 1.0),
            fragment(1, "everyone", 1.1, 2.0),
        ];
        let frames: Vec<_> = build(&fragments, CaptionConfig::default()).frames().collect();

        assert_eq!(frames.len(), 2);
        assert!((frames[0].end - (1.1 - 1.0 / 30.0)).abs() < 1e-9);
        assert_no_overlap(&frames);
        // the last caption keeps its full linger
        assert!((frames[1].end - 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_linger_clip_never_empties_caption() {
        let fragments = vec![fragment(0, "a", 0.0, 0.02), fragment(1, "b", 0.03, 0.5)];
        let frames: Vec<_> = build(&fragments, CaptionConfig::default()).frames().collect();

        assert_eq!(frames.len(), 2);
        assert!((frames[0].end - 0.03).abs() < 1e-9);
        assert_no_overlap(&frames);
    }

    #[test]
    fn test_author_line_breaks_kept() {
        let fragments = vec![fragment(0, "A: Berlin\nB: Paris", 0.0, 2.0)];
        let frames: Vec<_> = build(&fragments, CaptionConfig::default().with_budget(24, 2))
            .frames()
            .collect();

        assert_eq!(frames.len(), 1);
        let lines: Vec<&str> = frames[0].lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(lines, vec!["A: Berlin", "B: Paris"]);
    }

    #[test]
    fn test_line_break_flag_between_word_fragments() {
        let mut first = fragment(0, "Berlin", 0.0, 0.5);
        first.line_break = true;
        let fragments = vec![first, fragment(0, "Paris", 0.5, 1.0)];

        let one_line = CaptionConfig::default().with_budget(24, 1);
        let frames: Vec<_> = build(&fragments, one_line).frames().collect();
        assert_eq!(frames.len(), 2);

        let frames: Vec<_> = build(&fragments, CaptionConfig::default()).frames().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].lines.len(), 2);
    }

    #[test]
    fn test_long_gap_forces_boundary() {
        let fragments = vec![fragment(0, "one", 0.0, 0.4), fragment(0, "two", 2.0, 2.4)];
        let frames: Vec<_> = build(&fragments, CaptionConfig::default()).frames().collect();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_long_word_hard_broken() {
        let fragments = vec![fragment(0, "supercalifragilistic", 0.0, 2.0)];
        let frames: Vec<_> = build(&fragments, CaptionConfig::default().with_budget(8, 1))
            .frames()
            .collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].text, "supercal");
        assert_no_overlap(&frames);
    }

    #[test]
    fn test_restartable_and_deterministic() {
        let layout = build(&quiz_fragments(), CaptionConfig::default());
        let first: Vec<_> = layout.frames().collect();
        let second: Vec<_> = layout.frames().collect();
        assert_eq!(first, second);

        let again: Vec<_> = build(&quiz_fragments(), CaptionConfig::default())
            .frames()
            .collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_placement_inside_safe_area() {
        let config = CaptionConfig {
            anchor: VerticalAnchor::Bottom,
            ..CaptionConfig::default().with_budget(20, 2)
        };
        let frames: Vec<_> = build(&quiz_fragments(), config.clone()).frames().collect();
        let (x0, y0, w, h) = config.safe_area.rect(1280, 720);

        for line in frames.iter().flat_map(|f| f.lines.iter()) {
            assert!(line.x >= x0 as i32);
            assert!(line.x + line.width as i32 <= (x0 + w) as i32 + 1);
            assert!(line.baseline_y <= (y0 + h) as i32);
        }
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let measure: Arc<dyn TextMeasure> = Arc::new(FixedAdvance::default());
        let zero = CaptionConfig::default().with_budget(0, 1);
        assert!(matches!(
            layout(&quiz_fragments(), zero, canvas(), measure.clone()),
            Err(MediaError::Config(_))
        ));

        let bad_rate = CaptionCanvas::new(Resolution::new(1280, 720), 0.0);
        assert!(layout(&quiz_fragments(), CaptionConfig::default(), bad_rate, measure).is_err());
    }

    #[test]
    fn test_time_limit_and_srt() {
        let layout = build(&quiz_fragments(), CaptionConfig::default()).with_time_limit(4.4);
        let frames: Vec<_> = layout.frames().collect();
        assert!(frames.last().unwrap().end <= 4.4);

        let srt = layout.to_srt();
        assert!(srt.starts_with("1\n00:00:00,100 --> "));
        assert!(srt.contains("\nto the quiz\n"));
        assert_eq!(srt.matches(" --> ").count(), 3);
    }
}
