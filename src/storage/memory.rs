use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use super::{ChapterEntry, ChapterHit, VectorIndex};

/// In-process vector index with exact squared-L2 search. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<BTreeMap<String, ChapterEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Squared Euclidean distance, the value LanceDB reports as `_distance`
fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, entry: ChapterEntry) -> Result<()> {
        self.entries.write().await.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ChapterHit>> {
        let entries = self.entries.read().await;
        let mut hits: Vec<ChapterHit> = entries
            .values()
            .map(|e| ChapterHit {
                id: e.id.clone(),
                comic_hash: e.comic_hash.clone(),
                chapter: e.chapter.clone(),
                document: e.document.clone(),
                distance: l2_distance(vector, &e.vector),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<ChapterEntry>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn delete_by_comic(&self, comic_hash: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.comic_hash != comic_hash);
        Ok(before - entries.len())
    }

    async fn list_keys(&self) -> Result<BTreeSet<String>> {
        Ok(self.entries.read().await.values().map(ChapterEntry::key).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
