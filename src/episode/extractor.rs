use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use super::classifier::Classifier;
use super::model::{Episode, MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS};
use crate::feed::RawItem;
use crate::util::{clean_text, collapse_whitespace, truncate_chars};

/// Length of the digest-based fallback id.
const FALLBACK_ID_LEN: usize = 16;

/// Path segment that precedes the hex episode id in canonical links,
/// e.g. `https://stand.fm/episodes/64a1f0c2e4b0`.
const EPISODE_PATH_MARKER: &str = "episodes/";

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "oga", "opus", "wav", "flac"];

const BYTES_PER_MINUTE: f64 = 1024.0 * 1024.0;

/// Per-item extraction failure. Never fatal to a batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// A required field is absent or blank; `position` is 1-based.
    #[error("Item {position}: missing required field `{field}`")]
    MissingField { field: &'static str, position: usize },
}

/// Turns raw feed items into classified [`Episode`]s.
#[derive(Debug, Clone)]
pub struct Extractor {
    classifier: Classifier,
    channel_id: Option<String>,
}

impl Extractor {
    pub fn new(classifier: Classifier, channel_id: Option<String>) -> Self {
        Self {
            classifier,
            channel_id,
        }
    }

    /// Extracts every item independently, omitting the ones that fail.
    ///
    /// Failures are logged with the item's 1-based position. When two items
    /// derive the same id, the first one wins and the later one is dropped
    /// with a warning so ids stay unique within the batch.
    pub fn extract_all(&self, items: &[RawItem]) -> Vec<Episode> {
        let mut seen = HashSet::with_capacity(items.len());
        let mut episodes = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let position = index + 1;
            match self.extract(item, position) {
                Ok(episode) => {
                    if seen.insert(episode.id.clone()) {
                        episodes.push(episode);
                    } else {
                        tracing::warn!(
                            position = position,
                            id = %episode.id,
                            link = %episode.link,
                            "Duplicate episode id in feed, skipping item"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(position = position, error = %e, "Skipping feed item");
                }
            }
        }

        tracing::info!(
            items = items.len(),
            extracted = episodes.len(),
            "Extracted episodes from feed"
        );
        episodes
    }

    /// Extracts a single item.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::MissingField`] when the title or link is absent,
    /// blank, or (for the title) empty once markup is stripped.
    pub fn extract(&self, item: &RawItem, position: usize) -> Result<Episode, ExtractionError> {
        let raw_title = non_blank(item.title.as_deref())
            .ok_or(ExtractionError::MissingField { field: "title", position })?;
        let link = non_blank(item.link.as_deref())
            .ok_or(ExtractionError::MissingField { field: "link", position })?
            .trim()
            .to_string();

        let id = derive_id(&link);

        let title = clean_text(raw_title);
        if title.is_empty() {
            return Err(ExtractionError::MissingField { field: "title", position });
        }
        let description = clean_text(item.description.as_deref().unwrap_or(""));

        let published_date = item.pub_date.as_deref().and_then(|raw| {
            let parsed = parse_published(raw);
            if parsed.is_none() {
                tracing::warn!(position = position, pub_date = %raw, "Unparsable publish date");
            }
            parsed
        });

        let audio_url = resolve_audio_url(item, &link);
        let duration = resolve_duration(item);

        let text = format!("{title} {description}");
        let category = self.classifier.classify(&text).to_string();
        tracing::debug!(
            position = position,
            title = %title,
            category = %category,
            scores = ?self.classifier.scores(&text),
            "Classified episode"
        );

        Ok(Episode {
            id,
            title: collapse_whitespace(&truncate_chars(&title, MAX_TITLE_CHARS)),
            description: collapse_whitespace(&truncate_chars(&description, MAX_DESCRIPTION_CHARS)),
            link,
            published_date,
            audio_url,
            duration,
            channel_id: self.channel_id.clone(),
            category,
            extracted_at: Utc::now(),
            processed: false,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Derives a stable episode id from its link.
///
/// Links carrying `episodes/<hex>` use the hex segment. Anything else gets
/// the first 16 hex chars of the link's SHA-256, so the same link always
/// maps to the same id.
///
/// # Examples
///
/// ```
/// use podcast_ingest::episode::derive_id;
///
/// assert_eq!(derive_id("https://stand.fm/episodes/64a1f0c2e4b0"), "64a1f0c2e4b0");
/// assert_eq!(derive_id("https://example.com/show/42").len(), 16);
/// ```
pub fn derive_id(link: &str) -> String {
    for (idx, _) in link.match_indices(EPISODE_PATH_MARKER) {
        let tail = &link[idx + EPISODE_PATH_MARKER.len()..];
        let hex_len = tail
            .bytes()
            .take_while(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
            .count();
        if hex_len > 0 {
            return tail[..hex_len].to_string();
        }
    }

    let digest = Sha256::digest(link.as_bytes());
    let mut id = format!("{:x}", digest);
    id.truncate(FALLBACK_ID_LEN);
    id
}

/// Best-effort publish date parsing.
///
/// Tries RFC 2822 (the RSS `pubDate` format), RFC 3339, then bare
/// `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD` taken as UTC.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn resolve_audio_url(item: &RawItem, link: &str) -> Option<String> {
    let enclosure_url = item
        .enclosure
        .as_ref()
        .and_then(|e| non_blank(e.url.as_deref()))
        .map(|u| u.trim().to_string());

    enclosure_url.or_else(|| has_audio_extension(link).then(|| link.to_string()))
}

fn has_audio_extension(link: &str) -> bool {
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link.split(['?', '#']).next().unwrap_or(link).to_string(),
    };

    path.rsplit_once('.').is_some_and(|(_, ext)| {
        AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    })
}

fn resolve_duration(item: &RawItem) -> Option<String> {
    if let Some(explicit) = non_blank(item.duration.as_deref()) {
        return Some(explicit.trim().to_string());
    }

    let length = item.enclosure.as_ref()?.length.as_deref()?.trim();
    let bytes: u64 = length.parse().ok()?;
    // Roughly 1MB of audio per minute
    let minutes = (bytes as f64 / BYTES_PER_MINUTE).round() as u64;
    Some(format!("{minutes}:00"))
}
