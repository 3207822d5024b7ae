//! Alignment of script segments against narration audio.
//!
//! The narration is reduced to a 10 ms RMS envelope and a voicing map
//! ([`envelope`]). Each word gets a spoken-length estimate ([`estimate`]).
//! The [`engine`] distributes segments and words over voiced time, snaps
//! boundaries into pauses, scores every word and re-times weak segments.

pub mod engine;
pub mod envelope;
pub mod estimate;

pub use engine::{align, AlignmentEngine};
pub use envelope::{Pause, SpeechMap, HOP_SECONDS};
pub use estimate::{estimate_word, WordEstimate};
