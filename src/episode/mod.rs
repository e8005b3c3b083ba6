//! Episode extraction and classification.
//!
//! - [`extractor`] turns [`RawItem`](crate::feed::RawItem)s into [`Episode`]s:
//!   identity, cleaned text, date, audio reference, duration
//! - [`classifier`] scores text against a [`CategoryRuleset`]
//! - [`stats`] summarizes an extracted batch

mod classifier;
mod extractor;
mod model;
mod stats;

pub use classifier::{CategoryRuleset, Classifier, RulesetError, UNCATEGORIZED};
pub use extractor::{derive_id, parse_published, ExtractionError, Extractor};
pub use model::{Episode, MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS};
pub use stats::ProcessingStats;
