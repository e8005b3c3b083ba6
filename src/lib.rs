//! Podcast episode ingestion.
//!
//! Fetches an RSS feed, extracts and classifies its episodes, drops the ones
//! the record store already knows, and saves the rest with bounded
//! rate-limit retry and pacing between writes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use podcast_ingest::episode::{CategoryRuleset, Classifier, Extractor};
//! use podcast_ingest::pipeline::Pipeline;
//! use podcast_ingest::store::NotionStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = reqwest::Client::new();
//! let store = NotionStore::new(
//!     client.clone(),
//!     "secret_token".to_string().into(),
//!     "database-id",
//! );
//! let classifier = Classifier::new(Arc::new(CategoryRuleset::builtin()));
//! let pipeline = Pipeline::new(store, Extractor::new(classifier, None));
//!
//! let summary = pipeline.run(&client, "https://stand.fm/rss/channel").await?;
//! println!("{}", summary.message);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod episode;
pub mod feed;
pub mod pipeline;
pub mod store;
pub mod util;
