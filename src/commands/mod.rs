pub mod check;
pub mod init;
pub mod search;
pub mod serve;
pub mod submit;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::generation::{OpenAIAnalyzer, OpenAISummarizer};
use crate::indexing::{ArchiveProcessor, Backends};
use crate::library::Library;
use crate::storage::{open_index, VectorIndex};
use crate::tasks::TaskStore;

/// Long-lived components shared by the commands
pub struct Services {
    pub config: Arc<Config>,
    pub library: Library,
    pub store: Arc<TaskStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
}

impl Services {
    /// Open the embedding provider and the vector index
    pub async fn open(config: Config) -> Result<Self> {
        let embedder = create_provider(&config).context("Failed to initialize embeddings")?;
        let dimension = embedder.embedding_dimension();
        let index = open_index(&config, dimension)
            .await
            .context("Failed to open the vector index")?;
        info!(
            provider = embedder.provider_name(),
            dimension,
            backend = ?config.storage.backend,
            "Services ready"
        );

        Ok(Self {
            library: Library::new(&config.library.data_dir),
            config: Arc::new(config),
            store: Arc::new(TaskStore::new()),
            embedder,
            index,
        })
    }

    /// Archive processor backed by the configured OpenAI-compatible models
    pub fn processor(&self) -> Result<Arc<ArchiveProcessor>> {
        let backends = Backends {
            analyzer: Arc::new(OpenAIAnalyzer::new(&self.config.generation)?),
            summarizer: Arc::new(OpenAISummarizer::new(&self.config.generation)?),
            embedder: Arc::clone(&self.embedder),
            index: Arc::clone(&self.index),
        };
        Ok(Arc::new(ArchiveProcessor::new(
            &self.config,
            Arc::clone(&self.store),
            backends,
        )))
    }
}
