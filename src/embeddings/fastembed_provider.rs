use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::provider::EmbeddingProvider;
use crate::config::EmbeddingsConfig;
use crate::metrics::{EMBEDDING_LATENCY, EMBEDDING_REQUESTS};

/// Local ONNX embeddings through fastembed
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Load the configured model, downloading it on first use
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let model_type = Self::parse_model_name(&config.model);

        info!("Loading embedding model: {}", config.model);

        let model = TextEmbedding::try_new(
            InitOptions::new(model_type).with_show_download_progress(false),
        )
        .with_context(|| format!("Failed to initialize embedding model: {}", config.model))?;

        info!("Embedding model loaded successfully");

        Ok(Self {
            model: Arc::new(model),
            model_name: config.model.clone(),
            dimension: config
                .dimension
                .unwrap_or_else(|| Self::get_model_dimension(&config.model)),
        })
    }

    /// Parse model name string to fastembed EmbeddingModel enum
    fn parse_model_name(name: &str) -> EmbeddingModel {
        match name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" | "bge-small" | "BAAI/bge-small-en-v1.5" => {
                EmbeddingModel::BGESmallENV15
            }
            "bge-base-en-v1.5" | "bge-base" | "BAAI/bge-base-en-v1.5" => {
                EmbeddingModel::BGEBaseENV15
            }
            "nomic-embed-text-v1.5" | "nomic-embed-text" => EmbeddingModel::NomicEmbedTextV15,
            _ => {
                warn!("Unknown local model '{}', falling back to bge-small-en-v1.5", name);
                EmbeddingModel::BGESmallENV15
            }
        }
    }

    fn get_model_dimension(model_name: &str) -> usize {
        match model_name {
            name if name.contains("bge-base") => 768,
            name if name.contains("nomic") => 768,
            _ => 384,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        EMBEDDING_REQUESTS.inc();
        let start = Instant::now();

        // fastembed is synchronous
        let model = self.model.clone();
        let texts = texts.to_vec();
        let embeddings = tokio::task::spawn_blocking(move || {
            model
                .embed(texts, None)
                .with_context(|| "Failed to generate embeddings")
        })
        .await
        .context("FastEmbed processing task failed")??;

        EMBEDDING_LATENCY.observe(start.elapsed().as_secs_f64());
        Ok(embeddings)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding generated for {}", self.model_name))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &'static str {
        "fastembed"
    }
}
