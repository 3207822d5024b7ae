//! Spoken-duration estimates for script words.

use crate::captions::wrap::{words_with_breaks, LINE_BREAK};

/// Seconds per estimated unit at a neutral speaking rate.
pub const NOMINAL_SECONDS_PER_UNIT: f64 = 0.19;

/// Relative spoken length of one word plus the pause that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct WordEstimate {
    pub text: String,
    /// Syllable-like units spoken
    pub units: f64,
    /// Units of pause implied by trailing punctuation
    pub pause_after: f64,
    /// The text breaks the line after this word
    pub line_break: bool,
}

impl WordEstimate {
    pub fn total(&self) -> f64 {
        self.units + self.pause_after
    }

    /// Expected seconds at the nominal rate, pause excluded.
    pub fn nominal_seconds(&self) -> f64 {
        self.units * NOMINAL_SECONDS_PER_UNIT
    }

    /// Whether the word closes a sentence or clause.
    pub fn has_pause(&self) -> bool {
        self.pause_after > 0.0
    }
}

/// Estimate one whitespace-delimited word.
pub fn estimate_word(word: &str) -> WordEstimate {
    let core: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
    let lower = core.to_lowercase();

    let mut units = 0.0;

    let digits = lower.chars().filter(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        // "1984" -> "nineteen eighty four"
        units += digits as f64 * 1.3 + 0.4;
    }

    let letters: String = lower.chars().filter(|c| c.is_alphabetic()).collect();
    if !letters.is_empty() {
        units += syllables(&letters) as f64;
        units += consonant_cluster_weight(&letters);
    }

    WordEstimate {
        text: word.to_string(),
        units: units.max(0.6),
        pause_after: punctuation_pause(word),
        line_break: false,
    }
}

/// Estimate every word of a text.
pub fn estimate_text(text: &str) -> Vec<WordEstimate> {
    let mut words: Vec<WordEstimate> = Vec::new();
    for word in words_with_breaks(text) {
        if word == LINE_BREAK {
            if let Some(last) = words.last_mut() {
                last.line_break = true;
            }
        } else {
            words.push(estimate_word(word));
        }
    }
    words
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y' | 'à' | 'á' | 'â' | 'é' | 'è' | 'ê' | 'í' | 'ó' | 'ô' | 'ú' | 'ü')
}

/// Vowel groups, with a silent trailing `e` dropped.
fn syllables(word: &str) -> usize {
    let chars: Vec<char> = word.chars().collect();
    let mut count = 0;
    let mut prev_vowel = false;
    for &c in &chars {
        let vowel = is_vowel(c);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }

    let len = chars.len();
    if count > 1 && len > 2 && chars[len - 1] == 'e' && !is_vowel(chars[len - 2]) && chars[len - 2] != 'l' {
        count -= 1;
    }
    count.max(1)
}

/// Runs of three or more consonants take longer to say.
fn consonant_cluster_weight(word: &str) -> f64 {
    let mut weight = 0.0;
    let mut run = 0;
    for c in word.chars() {
        if is_vowel(c) {
            run = 0;
        } else {
            run += 1;
            if run >= 3 {
                weight += 0.15;
            }
        }
    }
    weight
}

fn punctuation_pause(word: &str) -> f64 {
    let trimmed = word.trim_end_matches(|c: char| c == '"' || c == '\'' || c == ')' || c == '”');
    match trimmed.chars().last() {
        Some('.') | Some('!') | Some('?') | Some('…') => 1.0,
        Some(',') | Some(';') | Some(':') => 0.5,
        Some('-') | Some('—') => 0.3,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syllable_counts() {
        assert_eq!(syllables("welcome"), 2);
        assert_eq!(syllables("quiz"), 1);
        assert_eq!(syllables("begin"), 2);
        assert_eq!(syllables("table"), 2);
        assert_eq!(syllables("quizzes"), 2);
    }

    #[test]
    fn test_longer_words_take_longer() {
        let short = estimate_word("to");
        let long = estimate_word("extraordinary");
        assert!(long.units > short.units * 3.0);
    }

    #[test]
    fn test_numbers_are_spoken() {
        let year = estimate_word("1984");
        assert!(year.units > 5.0);
    }

    #[test]
    fn test_punctuation_pause() {
        assert_eq!(estimate_word("begin.").pause_after, 1.0);
        assert_eq!(estimate_word("quiz,").pause_after, 0.5);
        assert_eq!(estimate_word("\"Really?\"").pause_after, 1.0);
        assert_eq!(estimate_word("let's").pause_after, 0.0);
        assert!(!estimate_word("let's").has_pause());
    }

    #[test]
    fn test_estimate_text() {
        let words = estimate_text("Welcome  to\nthe quiz");
        assert_eq!(words.len(), 4);
        assert_eq!(words[3].text, "quiz");
    }
}
