//! Live metrics derived from the session start time and feed size.
//!
//! Everything here is a pure function of its inputs. Callers pass `now`
//! explicitly so the values are recomputed on every tick and every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Duration shown while no session is running.
pub const IDLE_DURATION: &str = "00:00:00";

/// Snapshot of the live metrics shown next to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStats {
    /// Comments currently in the feed
    pub total_comments: usize,
    /// Elapsed session time as `HH:MM:SS`
    pub duration: String,
    /// Rounded arrival rate
    pub comments_per_minute: u64,
}

impl LiveStats {
    /// Compute stats for a session that started at `started_at` (if any).
    pub fn compute(
        started_at: Option<DateTime<Utc>>,
        buffer_len: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            total_comments: buffer_len,
            duration: format_duration(started_at, now),
            comments_per_minute: rate_per_minute(started_at, buffer_len, now),
        }
    }

    /// Stats for a stopped session.
    pub fn idle() -> Self {
        Self {
            total_comments: 0,
            duration: IDLE_DURATION.to_string(),
            comments_per_minute: 0,
        }
    }
}

impl Default for LiveStats {
    fn default() -> Self {
        Self::idle()
    }
}

/// Format `now - started_at` as zero-padded `HH:MM:SS`.
///
/// Returns [`IDLE_DURATION`] when there is no start time. A start time in the
/// future (clock skew) also reads as zero. Hours are not wrapped at 24.
pub fn format_duration(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(start) = started_at else {
        return IDLE_DURATION.to_string();
    };

    let total_secs = (now - start).num_seconds().max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Comments per minute since `started_at`, rounded to the nearest integer.
///
/// Always finite: `0` when there is no start time, when no time has elapsed,
/// or when the clock reads earlier than the start.
pub fn rate_per_minute(
    started_at: Option<DateTime<Utc>>,
    buffer_len: usize,
    now: DateTime<Utc>,
) -> u64 {
    let Some(start) = started_at else {
        return 0;
    };

    let elapsed_ms = (now - start).num_milliseconds();
    if elapsed_ms <= 0 {
        return 0;
    }

    let elapsed_minutes = elapsed_ms as f64 / 60_000.0;
    let rate = (buffer_len as f64 / elapsed_minutes).round();
    if rate.is_finite() && rate >= 0.0 {
        rate as u64
    } else {
        0
    }
}
