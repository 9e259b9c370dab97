//! Vector index of chapter summaries

mod lancedb;
mod memory;

pub use self::lancedb::LanceStorage;
pub use memory::MemoryIndex;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{Config, StorageBackend};

/// One indexed chapter
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterEntry {
    /// `<comic_hash>_<chapter>`
    pub id: String,
    pub comic_hash: String,
    pub chapter: String,
    /// Summary text the vector was computed from
    pub document: String,
    pub vector: Vec<f32>,
}

impl ChapterEntry {
    pub fn new(comic_hash: &str, chapter: &str, document: String, vector: Vec<f32>) -> Self {
        Self {
            id: chapter_id(comic_hash, chapter),
            comic_hash: comic_hash.to_string(),
            chapter: chapter.to_string(),
            document,
            vector,
        }
    }

    pub fn key(&self) -> String {
        index_key(&self.comic_hash, &self.chapter)
    }
}

/// Nearest-neighbour result
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterHit {
    pub id: String,
    pub comic_hash: String,
    pub chapter: String,
    pub document: String,
    /// Squared L2 distance to the query, smaller is closer
    pub distance: f32,
}

impl ChapterHit {
    /// `1 / (1 + distance)`
    pub fn similarity(&self) -> f64 {
        1.0 / (1.0 + self.distance as f64)
    }
}

/// Composite vector id of a chapter
pub fn chapter_id(comic_hash: &str, chapter: &str) -> String {
    format!("{}_{}", comic_hash, chapter)
}

/// `<hash>/<chapter>` key used when comparing the index with the filesystem
pub fn index_key(comic_hash: &str, chapter: &str) -> String {
    format!("{}/{}", comic_hash, chapter)
}

/// Storage for chapter embeddings
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry with the same id
    async fn upsert(&self, entry: ChapterEntry) -> Result<()>;

    /// The `k` nearest entries, closest first
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ChapterHit>>;

    async fn get(&self, id: &str) -> Result<Option<ChapterEntry>>;

    /// Returns whether an entry was removed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Remove every chapter of a comic, returning how many were removed
    async fn delete_by_comic(&self, comic_hash: &str) -> Result<usize>;

    /// Every `<hash>/<chapter>` key in the index
    async fn list_keys(&self) -> Result<BTreeSet<String>>;

    async fn count(&self) -> Result<usize>;

    /// Move a chapter entry to a new chapter name.
    ///
    /// The new entry is written before the old one is removed, so the chapter
    /// is briefly present twice but never missing. Returns false when there
    /// is no entry under the old name.
    async fn rename_chapter(&self, comic_hash: &str, old: &str, new: &str) -> Result<bool> {
        let Some(entry) = self.get(&chapter_id(comic_hash, old)).await? else {
            return Ok(false);
        };
        self.upsert(ChapterEntry::new(comic_hash, new, entry.document, entry.vector))
            .await?;
        self.delete(&entry.id).await?;
        Ok(true)
    }
}

/// Open the configured backend
pub async fn open_index(config: &Config, dimension: usize) -> Result<Arc<dyn VectorIndex>> {
    match config.storage.backend {
        StorageBackend::Lancedb => Ok(Arc::new(
            LanceStorage::new(&config.db_path(), &config.storage.table, dimension).await?,
        )),
        StorageBackend::Memory => Ok(Arc::new(MemoryIndex::new())),
    }
}
