use anyhow::{anyhow, Context, Result};
use async_openai::{
    config::OpenAIConfig as AsyncOpenAIConfig, types::CreateEmbeddingRequestArgs, Client,
};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

use super::provider::EmbeddingProvider;
use crate::config::EmbeddingsConfig;
use crate::metrics::{EMBEDDING_LATENCY, EMBEDDING_REQUESTS};

/// OpenAI-compatible embedding endpoint
pub struct OpenAIProvider {
    client: Client<AsyncOpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAIProvider {
    /// Create a provider; `api_key` is already resolved by the caller
    pub fn new(config: &EmbeddingsConfig, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("OpenAI embedding provider requires an API key"));
        }

        let mut openai_config = AsyncOpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        info!("Initialized OpenAI embeddings with model: {}", config.model);

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            dimension: config
                .dimension
                .unwrap_or_else(|| Self::get_model_dimension(&config.model)),
        })
    }

    /// Get embedding dimension for specific model
    fn get_model_dimension(model_name: &str) -> usize {
        match model_name {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        EMBEDDING_REQUESTS.inc();
        let start = Instant::now();

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .context("Failed to build OpenAI embedding request")?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .context("OpenAI embedding request failed")?;

        EMBEDDING_LATENCY.observe(start.elapsed().as_secs_f64());
        debug!("Embedded {} texts", texts.len());

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
