use chrono::{DateTime, Utc};

/// Maximum title length in chars (including the ellipsis when capped).
pub const MAX_TITLE_CHARS: usize = 100;
/// Maximum description length in chars (including the ellipsis when capped).
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// A normalized feed entry, ready for dedup and persistence.
///
/// `title` and `link` are never empty; items without them are dropped during
/// extraction rather than represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    /// Stable identity, the only key used for dedup against the store.
    pub id: String,
    pub title: String,
    pub description: String,
    /// Canonical episode page URL.
    pub link: String,
    pub published_date: Option<DateTime<Utc>>,
    pub audio_url: Option<String>,
    /// `H:MM:SS`/`M:SS` from the feed, or an `M:00` estimate.
    pub duration: Option<String>,
    pub channel_id: Option<String>,
    pub category: String,
    pub extracted_at: DateTime<Utc>,
    pub processed: bool,
}
