//! Greedy line wrapping under a character and pixel budget.

use super::measure::TextMeasure;

/// Budget a caption's lines must fit.
pub struct WrapLimits<'a> {
    pub max_chars: usize,
    pub max_lines: usize,
    /// Width of the safe area in pixels
    pub max_width: f32,
    pub size: f32,
    pub measure: &'a dyn TextMeasure,
}

/// Word list entry that forces a new line.
pub const LINE_BREAK: &str = "\n";

/// Split text into words, keeping each author line break as a
/// [`LINE_BREAK`] entry between the words it separates.
pub fn words_with_breaks(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 && words.last().is_some_and(|w| *w != LINE_BREAK) {
            words.push(LINE_BREAK);
        }
        words.extend(line.split_whitespace());
    }
    if words.last() == Some(&LINE_BREAK) {
        words.pop();
    }
    words
}

/// Wrap words into lines, or `None` if they do not fit the budget.
///
/// A line holding a single word is accepted even when wider than
/// `max_width`, since no break can make it narrower. [`LINE_BREAK`]
/// entries end the current line.
pub fn wrap_words(words: &[&str], limits: &WrapLimits<'_>) -> Option<Vec<String>> {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    for word in words {
        if *word == LINE_BREAK {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            continue;
        }
        if word.chars().count() > limits.max_chars {
            return None;
        }

        if line.is_empty() {
            line.push_str(word);
            continue;
        }

        let candidate = format!("{line} {word}");
        let fits_chars = candidate.chars().count() <= limits.max_chars;
        let fits_width = limits.measure.advance(&candidate, limits.size) <= limits.max_width;
        if fits_chars && fits_width {
            line = candidate;
        } else {
            lines.push(std::mem::take(&mut line));
            if lines.len() >= limits.max_lines {
                return None;
            }
            line.push_str(word);
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    (lines.len() <= limits.max_lines).then_some(lines)
}

/// Split a word into pieces of at most `max_chars` characters.
pub fn hard_break(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= max_chars || max_chars == 0 {
        return vec![word.to_string()];
    }
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
