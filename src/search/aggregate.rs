use serde::Serialize;
use std::cmp::Ordering;

use crate::natural::natural_cmp;
use crate::storage::ChapterHit;

/// Title used when a hit's comic has no readable `info.json`
pub const UNKNOWN_TITLE: &str = "Unknown comic";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterMatch {
    pub chapter: String,
    pub similarity: f64,
}

/// One comic in the search results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComicMatch {
    pub title: String,
    pub hash: String,
    /// Sum of the similarities of the matched chapters
    pub relevance: f64,
    /// Natural chapter order
    pub matched_chapters: Vec<ChapterMatch>,
}

/// Group chapter hits by comic title.
///
/// `title_of` maps a comic hash to its display name. Hits sharing a title are
/// merged under the hash of the first one seen. Comics are ordered by
/// relevance, highest first; ties keep the order of their best hit.
pub fn aggregate_hits<F>(hits: &[ChapterHit], mut title_of: F) -> Vec<ComicMatch>
where
    F: FnMut(&str) -> String,
{
    let mut matches: Vec<ComicMatch> = Vec::new();

    for hit in hits {
        let title = title_of(&hit.comic_hash);
        let similarity = hit.similarity();

        let position = match matches.iter().position(|m| m.title == title) {
            Some(i) => i,
            None => {
                matches.push(ComicMatch {
                    title,
                    hash: hit.comic_hash.clone(),
                    relevance: 0.0,
                    matched_chapters: Vec::new(),
                });
                matches.len() - 1
            }
        };

        let entry = &mut matches[position];
        entry.relevance += similarity;
        entry.matched_chapters.push(ChapterMatch {
            chapter: hit.chapter.clone(),
            similarity,
        });
    }

    for m in &mut matches {
        m.matched_chapters
            .sort_by(|a, b| natural_cmp(&a.chapter, &b.chapter));
    }
    matches.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(Ordering::Equal)
    });
    matches
}
