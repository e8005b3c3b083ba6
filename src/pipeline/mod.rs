//! Ingestion pipeline: parse → extract → dedup → persist.
//!
//! [`Pipeline`] owns the per-run wiring. The stages themselves live in
//! [`crate::feed`], [`crate::episode`], [`dedup`] and [`persist`] and can be
//! driven individually.

mod dedup;
mod persist;

pub use dedup::{fetch_existing_ids, partition_new, resolve, DedupError};
pub use persist::{persist, PersistOptions, SaveFailure, SaveOutcome};

use chrono::Utc;
use thiserror::Error;

use crate::episode::{Episode, Extractor, ProcessingStats};
use crate::feed::{fetch_feed, parse_feed, FeedError, FetchError};
use crate::store::RecordStore;

/// Default page size for the identity scan.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Largest page Notion accepts; bigger requests fail with `validation_error`.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Run-level failures. Item-level failures never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to parse feed: {0}")]
    Feed(#[from] FeedError),

    #[error(transparent)]
    IndexFetch(#[from] DedupError),
}

/// What one run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Items that survived extraction
    pub fetched: usize,
    /// Episodes not yet in the store
    pub new: usize,
    /// One per saved (or attempted) episode; empty on dry runs
    pub outcomes: Vec<SaveOutcome>,
    /// Would-be-new episodes, filled only on dry runs
    pub pending: Vec<Episode>,
    pub stats: ProcessingStats,
    pub message: String,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    fn empty(fetched: usize, stats: ProcessingStats, message: &str) -> Self {
        Self {
            fetched,
            new: 0,
            outcomes: Vec::new(),
            pending: Vec::new(),
            stats,
            message: message.to_string(),
        }
    }
}

/// One configured ingestion pass over a store.
pub struct Pipeline<S> {
    store: S,
    extractor: Extractor,
    page_size: u32,
    options: PersistOptions,
    dry_run: bool,
}

impl<S: RecordStore> Pipeline<S> {
    pub fn new(store: S, extractor: Extractor) -> Self {
        Self {
            store,
            extractor,
            page_size: DEFAULT_PAGE_SIZE,
            options: PersistOptions::default(),
            dry_run: false,
        }
    }

    /// Ids requested per index page, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn page_size(mut self, page_size: u32) -> Self {
        let clamped = page_size.clamp(1, MAX_PAGE_SIZE);
        if clamped != page_size {
            tracing::warn!(
                requested = page_size,
                using = clamped,
                "Page size out of range, clamping"
            );
        }
        self.page_size = clamped;
        self
    }

    pub fn persist_options(mut self, options: PersistOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop after dedup and report what would be written.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetches `feed_url` and runs the rest of the pipeline on it.
    pub async fn run(
        &self,
        client: &reqwest::Client,
        feed_url: &str,
    ) -> Result<RunSummary, PipelineError> {
        tracing::info!(url = %feed_url, "Fetching feed");
        let markup = fetch_feed(client, feed_url).await?;
        self.run_markup(&markup).await
    }

    /// Runs the pipeline on already-fetched feed markup.
    pub async fn run_markup(&self, markup: &str) -> Result<RunSummary, PipelineError> {
        let items = parse_feed(markup)?;
        tracing::info!(items = items.len(), "Parsed feed");

        let episodes = self.extractor.extract_all(&items);
        let stats = ProcessingStats::from_episodes(&episodes, Utc::now());
        stats.log();

        if episodes.is_empty() {
            return Ok(RunSummary::empty(0, stats, "No episodes found in feed"));
        }
        let fetched = episodes.len();

        let new = dedup::resolve(&self.store, episodes, self.page_size).await?;
        if new.is_empty() {
            return Ok(RunSummary::empty(fetched, stats, "No new episodes"));
        }

        if self.dry_run {
            return Ok(RunSummary {
                fetched,
                new: new.len(),
                outcomes: Vec::new(),
                message: format!("Dry run: {} new episodes not saved", new.len()),
                pending: new,
                stats,
            });
        }

        let outcomes = persist::persist(&self.store, &new, &self.options).await;
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();

        Ok(RunSummary {
            fetched,
            new: new.len(),
            message: format!("Saved {succeeded} of {} new episodes", new.len()),
            outcomes,
            pending: Vec::new(),
            stats,
        })
    }
}
