//! Semantic search over chapter summaries, aggregated per comic.
//!
//! - `aggregate` - grouping of chapter hits into ranked comic matches
//! - `engine` - query embedding, vector lookup and title resolution

mod aggregate;
mod engine;

pub use aggregate::{aggregate_hits, ChapterMatch, ComicMatch, UNKNOWN_TITLE};
pub use engine::ComicSearch;
