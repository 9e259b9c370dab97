use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::aggregate::{aggregate_hits, ComicMatch, UNKNOWN_TITLE};
use crate::embeddings::EmbeddingProvider;
use crate::library::Library;
use crate::metrics::{SEARCH_LATENCY, SEARCH_REQUESTS};
use crate::storage::VectorIndex;

/// Semantic search over indexed chapter summaries
pub struct ComicSearch {
    library: Library,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ComicSearch {
    pub fn new(library: Library, index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            library,
            index,
            embedder,
        }
    }

    /// Comics whose chapters match `query`, most relevant first.
    ///
    /// `k` bounds the number of chapter hits considered, not the number of
    /// comics returned. A blank query returns nothing.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ComicMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        SEARCH_REQUESTS.inc();
        let start = Instant::now();
        info!(query, k, "Searching chapters");

        let vector = self
            .embedder
            .embed_query(query)
            .await
            .with_context(|| format!("Failed to embed query: {}", query))?;
        debug!("Query embedding has {} dimensions", vector.len());

        let hits = self
            .index
            .query(&vector, k)
            .await
            .context("Vector search failed")?;

        let mut titles: HashMap<String, String> = HashMap::new();
        let results = aggregate_hits(&hits, |hash| {
            titles
                .entry(hash.to_string())
                .or_insert_with(|| self.title_of(hash))
                .clone()
        });

        let elapsed = start.elapsed();
        SEARCH_LATENCY.observe(elapsed.as_secs_f64());
        info!(
            hits = hits.len(),
            comics = results.len(),
            "Search completed in {:.2}ms",
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(results)
    }

    fn title_of(&self, hash: &str) -> String {
        match self.library.read_info(hash) {
            Ok(info) => info.name,
            Err(e) => {
                warn!(hash, "No title for comic: {:#}", e);
                UNKNOWN_TITLE.to_string()
            }
        }
    }
}
