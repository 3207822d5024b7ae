//! Energy-envelope forced alignment of a script against narration audio.

use metrics::counter;
use tracing::{debug, warn};
use tvid_models::script::validate_script;
use tvid_models::{AlignedFragment, AlignmentConfig, AlignmentGranularity, ScriptSegment};

use super::envelope::{SpeechMap, HOP_SECONDS};
use super::estimate::{estimate_text, WordEstimate, NOMINAL_SECONDS_PER_UNIT};
use crate::audio::{AudioTrack, ANALYSIS_SAMPLE_RATE};
use crate::error::{MediaError, MediaResult};
use crate::metrics::names;

/// Script segment with its word estimates and share weight.
struct SegmentPlan {
    index: u32,
    words: Vec<WordEstimate>,
    weight: f64,
}

/// Time window `[start, end]` assigned to one segment.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: f64,
    end: f64,
}

/// Word placed in time, before merging.
#[derive(Debug, Clone)]
struct WordSlot {
    start: f64,
    end: f64,
    confidence: f32,
}

/// Aligns script segments against narration.
#[derive(Debug, Clone)]
pub struct AlignmentEngine {
    config: AlignmentConfig,
}

impl AlignmentEngine {
    pub fn new(config: AlignmentConfig) -> MediaResult<Self> {
        config.check()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Align segments using the envelope alone.
    pub fn align(
        &self,
        audio: &AudioTrack,
        segments: &[ScriptSegment],
    ) -> MediaResult<Vec<AlignedFragment>> {
        let (map, plans) = self.prepare(audio, segments)?;
        let windows = self.envelope_windows(&map, &plans);
        self.place(&map, &plans, &windows, audio.duration())
    }

    /// Align segments whose start offsets were reported by the synthesizer.
    pub fn align_with_timepoints(
        &self,
        audio: &AudioTrack,
        segments: &[ScriptSegment],
        timepoints: &[f64],
    ) -> MediaResult<Vec<AlignedFragment>> {
        if timepoints.len() != segments.len() {
            return Err(MediaError::alignment(format!(
                "{} timepoints for {} segments",
                timepoints.len(),
                segments.len()
            )));
        }
        let (map, plans) = self.prepare(audio, segments)?;
        let windows = self.timepoint_windows(&map, timepoints, audio.duration())?;
        self.place(&map, &plans, &windows, audio.duration())
    }

    fn prepare(
        &self,
        audio: &AudioTrack,
        segments: &[ScriptSegment],
    ) -> MediaResult<(SpeechMap, Vec<SegmentPlan>)> {
        let duration = audio.duration();
        if !duration.is_finite() || duration <= 0.0 {
            return Err(MediaError::alignment("audio has no duration"));
        }

        validate_script(segments).map_err(|e| MediaError::alignment(e.to_string()))?;

        let plans: Vec<SegmentPlan> = segments
            .iter()
            .map(|segment| {
                let words = estimate_text(&segment.text);
                let estimated =
                    words.iter().map(WordEstimate::total).sum::<f64>() * NOMINAL_SECONDS_PER_UNIT;
                SegmentPlan {
                    index: segment.index,
                    weight: segment.duration_hint.unwrap_or(estimated),
                    words,
                }
            })
            .collect();

        let word_count: usize = plans.iter().map(|p| p.words.len()).sum();
        if word_count == 0 {
            return Err(MediaError::alignment("script has no words"));
        }

        let required = word_count as f64 * self.config.min_word_duration;
        if duration + 1e-9 < required {
            return Err(MediaError::alignment(format!(
                "audio lasts {duration:.3}s but {word_count} word(s) need at least {required:.3}s"
            )));
        }

        let map = SpeechMap::analyze(
            audio.analysis_samples(),
            ANALYSIS_SAMPLE_RATE,
            self.config.min_pause,
        );
        if map.is_silent() {
            return Err(MediaError::alignment(format!(
                "audio is silent (peak level {:.4})",
                map.peak()
            )));
        }

        debug!(
            duration_secs = duration,
            voiced_secs = map.voiced_total(),
            pauses = map.pauses().len(),
            segments = plans.len(),
            words = word_count,
            "Speech map ready"
        );

        Ok((map, plans))
    }

    /// Segment windows from cumulative expected duration over voiced time,
    /// each cut snapped into the strongest nearby pause.
    fn envelope_windows(&self, map: &SpeechMap, plans: &[SegmentPlan]) -> Vec<Window> {
        let (speech_start, speech_end) = map.speech_bounds().unwrap_or((0.0, map.duration()));
        let voiced = map.voiced_total();
        let total_weight: f64 = plans.iter().map(|p| p.weight).sum::<f64>().max(f64::EPSILON);

        let mut cuts: Vec<(f64, f64)> = Vec::with_capacity(plans.len().saturating_sub(1));
        let mut cumulative = 0.0;
        for plan in &plans[..plans.len() - 1] {
            cumulative += plan.weight;
            let raw = map.time_at_voiced(voiced * cumulative / total_weight);
            let floor = cuts.last().map(|c| c.1).unwrap_or(speech_start);

            let cut = match map.strongest_pause_near(raw, self.config.snap_window) {
                Some(pause) if pause.start >= floor && cuts.last() != Some(&(pause.start, pause.end)) => {
                    (pause.start, pause.end)
                }
                _ => {
                    let t = raw.max(floor);
                    (t, map.next_voiced_from(t))
                }
            };
            cuts.push(cut);
        }

        let mut windows = Vec::with_capacity(plans.len());
        let mut start = speech_start;
        for cut in &cuts {
            windows.push(Window { start, end: cut.0 });
            start = cut.1;
        }
        windows.push(Window {
            start,
            end: speech_end,
        });

        settle_windows(&mut windows, plans, map.duration());
        windows
    }

    /// Segment windows from synthesizer marks.
    fn timepoint_windows(
        &self,
        map: &SpeechMap,
        timepoints: &[f64],
        duration: f64,
    ) -> MediaResult<Vec<Window>> {
        validate_timepoints(timepoints, duration)?;
        let speech_end = map.speech_bounds().map(|b| b.1).unwrap_or(duration);
        let snap = self.config.snap_window;

        let mut windows = Vec::with_capacity(timepoints.len());
        for (i, &mark) in timepoints.iter().enumerate() {
            let mut start = mark;
            let mut end = match timepoints.get(i + 1) {
                Some(&next) => next,
                None => {
                    let nominal = (mark + self.config.last_mark_duration).min(duration);
                    if speech_end > nominal {
                        speech_end.min(duration)
                    } else {
                        nominal
                    }
                }
            };

            // Speech usually starts a little after the mark
            if let Some(pause) = map.pauses().iter().find(|p| p.contains(start, 0.0)) {
                if pause.end < end {
                    start = pause.end;
                }
            }

            // and stops before the next one
            if let Some(pause) = map
                .pauses()
                .iter()
                .filter(|p| p.start > start && p.start < end && p.end >= end - snap)
                .max_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal))
            {
                end = pause.start;
            }
            if i + 1 == timepoints.len() {
                end = end.min(speech_end.max(start + HOP_SECONDS)).min(duration);
            }

            windows.push(Window { start, end });
        }
        Ok(windows)
    }

    /// Place words in their windows, score them and apply the low-confidence fallback.
    fn place(
        &self,
        map: &SpeechMap,
        plans: &[SegmentPlan],
        windows: &[Window],
        duration: f64,
    ) -> MediaResult<Vec<AlignedFragment>> {
        if plans.len() != windows.len() {
            return Err(MediaError::alignment(format!(
                "{} segments but {} windows",
                plans.len(),
                windows.len()
            )));
        }

        let nominal_total: f64 = plans
            .iter()
            .flat_map(|p| p.words.iter())
            .map(WordEstimate::nominal_seconds)
            .sum();
        let tempo = if nominal_total > 0.0 {
            map.voiced_total() / nominal_total
        } else {
            1.0
        };

        let mut fragments = Vec::new();
        for (plan, window) in plans.iter().zip(windows) {
            if plan.words.is_empty() {
                continue;
            }

            let mut slots = self.place_words(map, plan, *window);
            for (slot, word) in slots.iter_mut().zip(&plan.words) {
                slot.confidence = score(map, slot, word, tempo);
            }

            let weakest = slots.iter().map(|s| s.confidence).fold(1.0_f32, f32::min);
            let low_confidence = weakest < self.config.confidence_threshold;
            if low_confidence {
                warn!(
                    segment = plan.index,
                    confidence = weakest,
                    threshold = self.config.confidence_threshold,
                    "Low alignment confidence, re-timing segment by character count"
                );
                counter!(names::ALIGNMENT_FALLBACKS_TOTAL).increment(1);
                retime_by_chars(&mut slots, &plan.words);
            }

            let words: Vec<AlignedFragment> = slots
                .iter()
                .zip(&plan.words)
                .map(|(slot, word)| AlignedFragment {
                    segment_index: plan.index,
                    text: word.text.clone(),
                    start: slot.start,
                    end: slot.end,
                    confidence: slot.confidence,
                    low_confidence,
                    line_break: word.line_break,
                })
                .collect();

            match self.config.granularity {
                AlignmentGranularity::Word => fragments.extend(words),
                AlignmentGranularity::Segment => fragments.push(merge_segment(&words)),
            }
        }

        enforce_order(&mut fragments, duration);

        if !tvid_models::fragment::is_well_ordered(&fragments) {
            return Err(MediaError::alignment("could not order fragments inside the audio"));
        }

        Ok(fragments)
    }

    /// Map cumulative word weight onto voiced time inside the window.
    fn place_words(&self, map: &SpeechMap, plan: &SegmentPlan, window: Window) -> Vec<WordSlot> {
        let Window { start: a, end: b } = window;
        let va = map.voiced_before(a);
        let vb = map.voiced_before(b);
        let voiced_span = vb - va;

        let last = plan.words.len() - 1;
        let total: f64 = plan
            .words
            .iter()
            .enumerate()
            .map(|(i, w)| if i < last { w.total() } else { w.units })
            .sum::<f64>()
            .max(f64::EPSILON);

        let at = |x: f64| -> f64 {
            if voiced_span < HOP_SECONDS {
                a + (b - a) * x
            } else {
                map.time_at_voiced(va + voiced_span * x).clamp(a, b)
            }
        };
        let onset = |x: f64| -> f64 {
            if voiced_span < HOP_SECONDS {
                a + (b - a) * x
            } else {
                map.next_voiced_from(at(x)).clamp(a, b)
            }
        };

        let mut slots = Vec::with_capacity(plan.words.len());
        let mut cumulative = 0.0;
        let mut pending_start: Option<f64> = None;
        for (i, word) in plan.words.iter().enumerate() {
            let start = pending_start
                .take()
                .unwrap_or_else(|| if i == 0 { a } else { onset(cumulative / total) });
            cumulative += word.units;
            let mut end = at(cumulative / total);

            if i < last {
                cumulative += word.pause_after;
                if word.has_pause() {
                    if let Some(pause) = map.strongest_pause_near(end, self.config.snap_window / 2.0) {
                        if pause.start > start && pause.end < b {
                            end = pause.start;
                            pending_start = Some(pause.end);
                        }
                    }
                }
            } else {
                end = b;
            }

            slots.push(WordSlot {
                start,
                end: end.max(start),
                confidence: 0.0,
            });
        }
        slots
    }
}

/// Convenience wrapper around [`AlignmentEngine`].
pub fn align(
    audio: &AudioTrack,
    segments: &[ScriptSegment],
    config: AlignmentConfig,
) -> MediaResult<Vec<AlignedFragment>> {
    AlignmentEngine::new(config)?.align(audio, segments)
}

/// Marks must be non-decreasing and inside the audio.
fn validate_timepoints(timepoints: &[f64], duration: f64) -> MediaResult<()> {
    let mut previous = 0.0;
    for (i, &mark) in timepoints.iter().enumerate() {
        if !mark.is_finite() || mark < 0.0 || mark >= duration {
            return Err(MediaError::alignment(format!(
                "timepoint {i} ({mark}) is outside the audio (0..{duration:.3})"
            )));
        }
        if mark < previous {
            return Err(MediaError::alignment(format!(
                "timepoint {i} ({mark}) precedes timepoint {} ({previous})",
                i - 1
            )));
        }
        previous = mark;
    }
    Ok(())
}

/// Combine boundary quality with duration plausibility.
fn score(map: &SpeechMap, slot: &WordSlot, word: &WordEstimate, tempo: f64) -> f32 {
    let boundary = (map.boundary_quality(slot.start) + map.boundary_quality(slot.end)) / 2.0;

    let expected = word.nominal_seconds() * tempo;
    let actual = slot.end - slot.start;
    let plausibility = if expected > 0.0 && actual > 0.0 {
        (-(actual / expected).ln().abs() / 3f64.ln()).exp() as f32
    } else {
        0.0
    };

    (0.5 * boundary + 0.5 * plausibility).clamp(0.0, 1.0)
}

/// Spread the segment's span over its words by character count.
fn retime_by_chars(slots: &mut [WordSlot], words: &[WordEstimate]) {
    let (Some(first), Some(last)) = (slots.first(), slots.last()) else {
        return;
    };
    let start = first.start;
    let span = (last.end - start).max(0.0);
    let weights: Vec<f64> = words
        .iter()
        .map(|w| w.text.chars().filter(|c| !c.is_whitespace()).count().max(1) as f64)
        .collect();
    let total: f64 = weights.iter().sum();

    let mut cumulative = 0.0;
    for (slot, weight) in slots.iter_mut().zip(weights) {
        slot.start = start + span * cumulative / total;
        cumulative += weight;
        slot.end = start + span * cumulative / total;
    }
}

fn merge_segment(words: &[AlignedFragment]) -> AlignedFragment {
    let mut text = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            text.push(if words[i - 1].line_break { '\n' } else { ' ' });
        }
        text.push_str(&word.text);
    }
    AlignedFragment {
        segment_index: words[0].segment_index,
        text,
        start: words[0].start,
        end: words[words.len() - 1].end,
        confidence: words.iter().map(|w| w.confidence).fold(1.0, f32::min),
        low_confidence: words.iter().any(|w| w.low_confidence),
        line_break: false,
    }
}

/// Keep windows ordered and long enough for their words.
fn settle_windows(windows: &mut [Window], plans: &[SegmentPlan], duration: f64) {
    let mut floor = 0.0_f64;
    for (window, plan) in windows.iter_mut().zip(plans) {
        let min_len = plan.words.len().max(1) as f64 * HOP_SECONDS;
        window.start = window.start.max(floor);
        window.end = window.end.max(window.start + min_len);
        floor = window.end;
    }
    let mut ceiling = duration;
    for (window, plan) in windows.iter_mut().zip(plans).rev() {
        let min_len = plan.words.len().max(1) as f64 * HOP_SECONDS;
        window.end = window.end.min(ceiling);
        window.start = window.start.min(window.end - min_len).max(0.0);
        ceiling = window.start;
    }
}

/// Final pass: non-decreasing starts, no overlap, at least one hop long,
/// everything inside `[0, duration]`.
fn enforce_order(fragments: &mut [AlignedFragment], duration: f64) {
    let mut previous_end = 0.0_f64;
    for fragment in fragments.iter_mut() {
        fragment.start = fragment.start.max(previous_end).max(0.0);
        fragment.end = fragment.end.max(fragment.start + HOP_SECONDS);
        previous_end = fragment.end;
    }

    let mut next_start = duration;
    for fragment in fragments.iter_mut().rev() {
        fragment.end = fragment.end.min(next_start);
        fragment.start = fragment.start.min(fragment.end - HOP_SECONDS);
        next_start = fragment.start;
    }
}
