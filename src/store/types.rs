use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use thiserror::Error;

use crate::episode::Episode;

// ============================================================================
// Error Types
// ============================================================================

/// Classification of a store failure, independent of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    NotFound,
    Unauthorized,
    Validation,
    RateLimited,
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            StoreErrorKind::NotFound => "not_found",
            StoreErrorKind::Unauthorized => "unauthorized",
            StoreErrorKind::Validation => "validation_error",
            StoreErrorKind::RateLimited => "rate_limited",
            StoreErrorKind::Other => "other",
        };
        f.write_str(code)
    }
}

/// Errors reported by a [`RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database or page does not exist (or is not shared with the integration)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The store rejected the payload; retrying will not help
    #[error("Validation error: {0}")]
    Validation(String),

    /// Too many requests; the caller may retry later
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Request exceeded the store client's timeout
    #[error("Request timed out")]
    Timeout,

    /// Anything else, including unexpected response shapes
    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::NotFound(_) => StoreErrorKind::NotFound,
            StoreError::Unauthorized(_) => StoreErrorKind::Unauthorized,
            StoreError::Validation(_) => StoreErrorKind::Validation,
            StoreError::RateLimited(_) => StoreErrorKind::RateLimited,
            StoreError::Network(_) | StoreError::Timeout | StoreError::Other(_) => {
                StoreErrorKind::Other
            }
        }
    }
}

// ============================================================================
// Record Types
// ============================================================================

/// One page of identities from a paged scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdPage {
    pub ids: Vec<String>,
    pub has_more: bool,
    /// Cursor for the next page; only meaningful when `has_more` is true
    pub next_cursor: Option<String>,
}

/// Workflow status stored alongside each episode record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Freshly ingested
    Unprocessed,
    /// Eligible for the article generation stage
    AwaitingGeneration,
}

/// Flat property map written for a new episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRecord {
    pub title: String,
    pub episode_id: String,
    pub description: String,
    pub url: String,
    pub published_on: Option<NaiveDate>,
    pub audio_url: Option<String>,
    /// Empty when unknown
    pub duration: String,
    pub category: String,
    pub status: RecordStatus,
    pub article_generated: bool,
    pub ingested_at: DateTime<Utc>,
}

impl EpisodeRecord {
    pub fn from_episode(episode: &Episode, ingested_at: DateTime<Utc>) -> Self {
        Self {
            title: episode.title.clone(),
            episode_id: episode.id.clone(),
            description: episode.description.clone(),
            url: episode.link.clone(),
            published_on: episode.published_date.map(|d| d.date_naive()),
            audio_url: episode.audio_url.clone(),
            duration: episode.duration.clone().unwrap_or_default(),
            category: episode.category.clone(),
            status: RecordStatus::Unprocessed,
            article_generated: false,
            ingested_at,
        }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Remote record store holding one record per episode.
///
/// Implementations must classify their failures through [`StoreError`] so
/// the pipeline can tell rate limiting and validation failures apart.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetches one page of known episode ids.
    ///
    /// `cursor` is `None` for the first page and the previous page's
    /// `next_cursor` afterwards.
    async fn query_ids(&self, page_size: u32, cursor: Option<&str>)
        -> Result<IdPage, StoreError>;

    /// Creates a record and returns the page id the store assigned to it.
    async fn create_episode(&self, record: &EpisodeRecord) -> Result<String, StoreError>;

    /// Updates the workflow status of an existing record.
    async fn mark_status(&self, page_id: &str, status: RecordStatus) -> Result<(), StoreError>;

    /// Verifies credentials and database access; returns a display name.
    async fn check_connection(&self) -> Result<String, StoreError>;
}
