//! Energy envelope and voicing analysis.

/// Analysis hop in seconds.
pub const HOP_SECONDS: f64 = 0.01;

/// Peak RMS below which audio is treated as silent (about -46 dBFS).
pub const SILENCE_FLOOR: f32 = 0.005;

/// Share of the noise-to-peak range a frame must clear to count as voiced.
const VOICING_RATIO: f32 = 0.2;

/// An unvoiced run long enough to separate phrases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pause {
    pub start: f64,
    pub end: f64,
}

impl Pause {
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64, slack: f64) -> bool {
        t >= self.start - slack && t <= self.end + slack
    }
}

/// Voicing map of a narration track.
#[derive(Debug, Clone)]
pub struct SpeechMap {
    energy: Vec<f32>,
    voiced: Vec<bool>,
    /// `voiced_prefix[i]` = voiced seconds in hops `0..i`
    voiced_prefix: Vec<f64>,
    pauses: Vec<Pause>,
    threshold: f32,
    peak: f32,
    duration: f64,
}

impl SpeechMap {
    /// Build the map from mono samples.
    pub fn analyze(samples: &[f32], sample_rate: u32, min_pause: f64) -> Self {
        let hop_len = ((sample_rate as f64 * HOP_SECONDS).round() as usize).max(1);
        let energy: Vec<f32> = samples
            .chunks(hop_len)
            .map(|chunk| {
                let sum: f32 = chunk.iter().map(|s| s * s).sum();
                (sum / chunk.len() as f32).sqrt()
            })
            .collect();
        let duration = samples.len() as f64 / sample_rate as f64;

        let peak = energy.iter().copied().fold(0.0f32, f32::max);
        let noise = percentile(&energy, 0.10);
        let threshold = (noise + (peak - noise) * VOICING_RATIO).max(SILENCE_FLOOR * 0.5);

        let voiced: Vec<bool> = energy.iter().map(|&e| e >= threshold).collect();

        let mut voiced_prefix = Vec::with_capacity(voiced.len() + 1);
        voiced_prefix.push(0.0);
        let mut acc = 0.0;
        for (i, &v) in voiced.iter().enumerate() {
            if v {
                acc += hop_duration(i, voiced.len(), duration);
            }
            voiced_prefix.push(acc);
        }

        let pauses = find_pauses(&voiced, duration, min_pause);

        Self {
            energy,
            voiced,
            voiced_prefix,
            pauses,
            threshold,
            peak,
            duration,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether the loudest part of the track is below the silence floor.
    pub fn is_silent(&self) -> bool {
        self.peak < SILENCE_FLOOR || !self.voiced.iter().any(|&v| v)
    }

    pub fn pauses(&self) -> &[Pause] {
        &self.pauses
    }

    /// Voiced seconds in the whole track.
    pub fn voiced_total(&self) -> f64 {
        self.voiced_prefix.last().copied().unwrap_or(0.0)
    }

    /// Start of the first and end of the last voiced hop.
    pub fn speech_bounds(&self) -> Option<(f64, f64)> {
        let first = self.voiced.iter().position(|&v| v)?;
        let last = self.voiced.iter().rposition(|&v| v)?;
        Some((
            first as f64 * HOP_SECONDS,
            ((last + 1) as f64 * HOP_SECONDS).min(self.duration),
        ))
    }

    /// Voiced seconds in `[0, t)`.
    pub fn voiced_before(&self, t: f64) -> f64 {
        if t <= 0.0 || self.voiced.is_empty() {
            return 0.0;
        }
        let pos = t / HOP_SECONDS;
        let idx = pos.floor() as usize;
        if idx >= self.voiced.len() {
            return self.voiced_total();
        }
        let partial = if self.voiced[idx] {
            (pos - idx as f64) * HOP_SECONDS
        } else {
            0.0
        };
        self.voiced_prefix[idx] + partial
    }

    /// Earliest time at which `v` voiced seconds have elapsed.
    pub fn time_at_voiced(&self, v: f64) -> f64 {
        if v <= 0.0 {
            return self
                .voiced
                .iter()
                .position(|&x| x)
                .map(|i| i as f64 * HOP_SECONDS)
                .unwrap_or(0.0);
        }
        if v >= self.voiced_total() {
            return self.speech_bounds().map(|(_, end)| end).unwrap_or(self.duration);
        }

        // first i with voiced_prefix[i + 1] >= v
        let i = self
            .voiced_prefix
            .partition_point(|&p| p < v - 1e-9)
            .saturating_sub(1);
        let into = (v - self.voiced_prefix[i]).clamp(0.0, HOP_SECONDS);
        (i as f64 * HOP_SECONDS + into).min(self.duration)
    }

    /// First voiced instant at or after `t`.
    pub fn next_voiced_from(&self, t: f64) -> f64 {
        let idx = ((t / HOP_SECONDS) + 1e-6).floor().max(0.0) as usize;
        if idx >= self.voiced.len() || self.voiced[idx] {
            return t;
        }
        match self.voiced[idx..].iter().position(|&v| v) {
            Some(offset) => ((idx + offset) as f64 * HOP_SECONDS).max(t),
            None => t,
        }
    }

    /// Longest pause overlapping `[t - window, t + window]`, closest on ties.
    pub fn strongest_pause_near(&self, t: f64, window: f64) -> Option<Pause> {
        self.pauses
            .iter()
            .filter(|p| p.end >= t - window && p.start <= t + window)
            .copied()
            .max_by(|a, b| {
                a.len()
                    .partial_cmp(&b.len())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        distance(b, t)
                            .partial_cmp(&distance(a, t))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            })
    }

    /// How clean a cut at `t` is, in `[0, 1]`.
    ///
    /// 1.0 inside a pause or at the edges of speech; otherwise how far the
    /// energy at `t` dips below the local maximum.
    pub fn boundary_quality(&self, t: f64) -> f32 {
        if self.pauses.iter().any(|p| p.contains(t, HOP_SECONDS)) {
            return 1.0;
        }
        if let Some((start, end)) = self.speech_bounds() {
            if t <= start + HOP_SECONDS || t >= end - HOP_SECONDS {
                return 1.0;
            }
        }
        if self.energy.is_empty() {
            return 0.0;
        }

        let idx = ((t / HOP_SECONDS) as usize).min(self.energy.len() - 1);
        let radius = 10;
        let lo = idx.saturating_sub(radius);
        let hi = (idx + radius + 1).min(self.energy.len());
        let local_max = self.energy[lo..hi].iter().cloned().fold(0.0_f32, f32::max);
        if local_max <= 0.0 {
            return 1.0;
        }
        let local_min = self.energy[idx.saturating_sub(1)..(idx + 2).min(self.energy.len())]
            .iter()
            .cloned()
            .fold(f32::MAX, f32::min);
        (1.0 - local_min / local_max).clamp(0.0, 1.0)
    }
}

fn hop_duration(i: usize, hops: usize, duration: f64) -> f64 {
    if i + 1 == hops {
        (duration - i as f64 * HOP_SECONDS).clamp(0.0, HOP_SECONDS)
    } else {
        HOP_SECONDS
    }
}

fn distance(pause: &Pause, t: f64) -> f64 {
    if pause.contains(t, 0.0) {
        0.0
    } else {
        (pause.start - t).abs().min((pause.end - t).abs())
    }
}

fn find_pauses(voiced: &[bool], duration: f64, min_pause: f64) -> Vec<Pause> {
    let mut pauses = Vec::new();
    let mut run_start: Option<usize> = None;
    let first_voiced = voiced.iter().position(|&v| v);
    let last_voiced = voiced.iter().rposition(|&v| v);

    let (Some(first), Some(last)) = (first_voiced, last_voiced) else {
        return pauses;
    };

    // Leading and trailing silence are not pauses between phrases
    for (i, &v) in voiced.iter().enumerate().take(last + 1).skip(first) {
        match (v, run_start) {
            (false, None) => run_start = Some(i),
            (true, Some(s)) => {
                let pause = Pause {
                    start: s as f64 * HOP_SECONDS,
                    end: (i as f64 * HOP_SECONDS).min(duration),
                };
                if pause.len() + 1e-9 >= min_pause {
                    pauses.push(pause);
                }
                run_start = None;
            }
            _ => {}
        }
    }
    pauses
}

fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((sorted.len() - 1) as f32 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
