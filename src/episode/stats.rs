use chrono::{DateTime, Duration, Utc};

use super::model::Episode;

/// Window used for [`ProcessingStats::recent`].
const RECENT_WINDOW_DAYS: i64 = 7;

/// Counts over one extraction batch, logged before dedup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub total: usize,
    pub with_audio: usize,
    pub with_duration: usize,
    /// Published within the last 7 days of `now`
    pub recent: usize,
}

impl ProcessingStats {
    pub fn from_episodes(episodes: &[Episode], now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(RECENT_WINDOW_DAYS);
        Self {
            total: episodes.len(),
            with_audio: episodes.iter().filter(|e| e.audio_url.is_some()).count(),
            with_duration: episodes.iter().filter(|e| e.duration.is_some()).count(),
            recent: episodes
                .iter()
                .filter(|e| e.published_date.is_some_and(|d| d > cutoff))
                .count(),
        }
    }

    pub fn log(&self) {
        tracing::info!(
            total = self.total,
            with_audio = self.with_audio,
            with_duration = self.with_duration,
            recent = self.recent,
            "Processing stats"
        );
    }
}
