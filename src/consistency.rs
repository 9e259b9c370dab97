//! Startup check that the library and the vector index describe the same chapters

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::library::{Area, Library};
use crate::storage::{chapter_id, index_key, VectorIndex};

/// Chapters present on only one side, as `<hash>/<chapter>` keys
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub only_in_filesystem: BTreeSet<String>,
    pub only_in_index: BTreeSet<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.only_in_filesystem.is_empty() && self.only_in_index.is_empty()
    }

    /// Human-readable listing of the differences
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if !self.only_in_filesystem.is_empty() {
            out.push_str("Chapters summarized on disk but missing from the index:\n");
            for key in &self.only_in_filesystem {
                out.push_str(&format!("  {}\n", key));
            }
        }
        if !self.only_in_index.is_empty() {
            out.push_str("Chapters in the index without a summary on disk:\n");
            for key in &self.only_in_index {
                out.push_str(&format!("  {}\n", key));
            }
        }
        out
    }
}

/// Keys of every chapter with a stored summary
pub fn filesystem_keys(library: &Library) -> Result<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for hash in library.comic_hashes()? {
        for chapter in library.summarized_chapters(&hash)? {
            keys.insert(index_key(&hash, &chapter));
        }
    }
    Ok(keys)
}

/// Compare summarized chapters on disk with the entries of the index
pub async fn check(library: &Library, index: &dyn VectorIndex) -> Result<ConsistencyReport> {
    let on_disk = filesystem_keys(library).context("Failed to scan the library")?;
    let indexed = index.list_keys().await.context("Failed to list index entries")?;

    let report = ConsistencyReport {
        only_in_filesystem: on_disk.difference(&indexed).cloned().collect(),
        only_in_index: indexed.difference(&on_disk).cloned().collect(),
    };
    info!(
        on_disk = on_disk.len(),
        indexed = indexed.len(),
        consistent = report.is_consistent(),
        "Consistency check finished"
    );
    Ok(report)
}

/// Delete whichever side each divergent chapter exists on.
///
/// Chapters only on disk lose their summary and page descriptions (the page
/// images stay); chapters only in the index lose their vector entry.
pub async fn reconcile(
    library: &Library,
    index: &dyn VectorIndex,
    report: &ConsistencyReport,
) -> Result<()> {
    for key in &report.only_in_filesystem {
        let Some((hash, chapter)) = key.split_once('/') else {
            warn!(key = %key, "Skipping malformed chapter key");
            continue;
        };
        library
            .remove_chapter(hash, chapter, &[Area::Summary, Area::Details])
            .with_context(|| format!("Failed to remove chapter files for {}", key))?;
        info!(hash, chapter, "Removed unindexed chapter files");
    }

    for key in &report.only_in_index {
        let Some((hash, chapter)) = key.split_once('/') else {
            warn!(key = %key, "Skipping malformed chapter key");
            continue;
        };
        index
            .delete(&chapter_id(hash, chapter))
            .await
            .with_context(|| format!("Failed to delete index entry for {}", key))?;
        info!(hash, chapter, "Removed orphaned index entry");
    }
    Ok(())
}
