//! Metric names emitted by the media stages.

/// Metric names as constants for consistency.
pub mod names {
    pub const ALIGNMENT_FALLBACKS_TOTAL: &str = "tvid_alignment_fallbacks_total";
    pub const FRAMES_RENDERED_TOTAL: &str = "tvid_frames_rendered_total";
    pub const FRAMES_PADDED_TOTAL: &str = "tvid_frames_padded_total";
    pub const CAPTION_OVERLAYS_TOTAL: &str = "tvid_caption_overlays_total";
    pub const ENCODE_DURATION_SECONDS: &str = "tvid_encode_duration_seconds";
}
