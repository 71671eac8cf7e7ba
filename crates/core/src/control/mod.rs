//! Helpers backing the playback widgets of the control panel.

use serde::{Deserialize, Serialize};

/// Formats seconds as `m:ss`. Negative and non-finite values read as `0:00`.
pub fn format_time(seconds: f64) -> String {
    let whole = if seconds.is_finite() {
        seconds.max(0.0).floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", whole / 60, whole % 60)
}

/// Maps a seekbar value in `0..=100` onto a time in seconds.
pub fn percent_to_seconds(percent: f64, duration_seconds: f64) -> f64 {
    (percent.clamp(0.0, 100.0) / 100.0) * duration_seconds.max(0.0)
}

/// Snapshot of what the transport widgets display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackDisplay {
    pub is_playing: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    /// Seekbar value, `0..=100`.
    pub percent: f64,
    pub label: String,
}

impl PlaybackDisplay {
    pub fn new(is_playing: bool, position_seconds: f64, duration_seconds: f64) -> Self {
        let percent = if duration_seconds > 0.0 {
            (position_seconds / duration_seconds * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            is_playing,
            position_seconds,
            duration_seconds,
            percent,
            label: format!(
                "{} / {}",
                format_time(position_seconds),
                format_time(duration_seconds)
            ),
        }
    }
}
