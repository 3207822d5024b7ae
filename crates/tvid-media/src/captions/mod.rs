//! Caption layout: grouping aligned words into timed, placed captions.

pub mod card;
pub mod layout;
pub mod measure;
pub mod wrap;

pub use card::layout_card;
pub use layout::{layout, CaptionCanvas, CaptionFrames, CaptionLayout};
pub use measure::{FixedAdvance, TextMeasure};
