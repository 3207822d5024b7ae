//! Timestamp formatting for subtitle sidecars.

/// Format seconds as an SRT cue timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_timestamp(total_secs: f64) -> String {
    let total_ms = (total_secs.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let mins = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_srt_timestamp() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(3661.25), "01:01:01,250");
    }
}
