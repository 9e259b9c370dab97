mod fastembed_provider;
mod openai_provider;
mod provider;

pub use fastembed_provider::FastEmbedProvider;
pub use openai_provider::OpenAIProvider;
pub use provider::EmbeddingProvider;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{Config, EmbeddingProviderKind};

/// Build the configured embedding provider.
///
/// The OpenAI provider uses `embeddings.api_key` when set and otherwise the
/// generation key, so one `OPENAI_API_KEY` covers both.
pub fn create_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embeddings.provider {
        EmbeddingProviderKind::OpenAI => {
            let key_source = if config.embeddings.api_key.is_empty() {
                &config.generation.api_key
            } else {
                &config.embeddings.api_key
            };
            let api_key = crate::config::resolve_api_key(key_source)
                .context("Failed to load OpenAI API key for embeddings")?;
            Ok(Arc::new(OpenAIProvider::new(&config.embeddings, api_key)?))
        }
        EmbeddingProviderKind::FastEmbed => {
            Ok(Arc::new(FastEmbedProvider::new(&config.embeddings)?))
        }
    }
}
