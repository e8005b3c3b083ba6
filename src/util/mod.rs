//! Text utilities used by the episode extractor.
//!
//! - **Markup cleanup**: tag stripping and the five standard HTML entities
//! - **Normalization**: control-character removal and whitespace collapsing
//! - **Capping**: char-based truncation with a trailing ellipsis
//!
//! # Examples
//!
//! ```
//! use podcast_ingest::util::{clean_text, truncate_chars};
//!
//! let title = clean_text("<b>Episode&nbsp;1</b> &amp; more");
//! assert_eq!(title, "Episode&nbsp;1 & more");
//!
//! assert_eq!(truncate_chars("A long episode title", 10), "A long ...");
//! ```

mod text;

pub use text::{
    clean_text, collapse_whitespace, decode_entities, strip_control_chars, strip_tags,
    truncate_chars,
};
