use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Turns chapter summaries and search queries into vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate embedding for a single query
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;

    /// Vector for one stored document. Line breaks are flattened to spaces
    /// before embedding.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        let flat = text.replace('\n', " ");
        self.embed(&[flat])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("embedding provider returned no vector"))
    }

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get provider name for logging and metrics
    fn provider_name(&self) -> &'static str;
}
