//! Feed retrieval and parsing.
//!
//! - [`fetcher`] - HTTP download of feed markup with retry and size limits
//! - [`parser`] - RSS 2.0 markup to an ordered list of [`RawItem`]s
//!
//! # Example
//!
//! ```ignore
//! use podcast_ingest::feed::{fetch_feed, parse_feed};
//!
//! let markup = fetch_feed(&client, "https://stand.fm/rss/abc").await?;
//! let items = parse_feed(&markup)?;
//! ```

mod fetcher;
mod parser;

pub use fetcher::{fetch_feed, FetchError};
pub use parser::{parse_feed, Enclosure, FeedError, RawItem};
