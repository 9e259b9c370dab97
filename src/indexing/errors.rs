//! Errors that fail an archive processing task

use thiserror::Error;

/// Stage of the pipeline, used in logs and error messages
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ProcessingStage {
    Extraction,
    Allocation,
    Cover,
    Analysis,
    Summarization,
    Embedding,
    Storage,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Extraction => write!(f, "extraction"),
            ProcessingStage::Allocation => write!(f, "allocation"),
            ProcessingStage::Cover => write!(f, "cover"),
            ProcessingStage::Analysis => write!(f, "analysis"),
            ProcessingStage::Summarization => write!(f, "summarization"),
            ProcessingStage::Embedding => write!(f, "embedding"),
            ProcessingStage::Storage => write!(f, "storage"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no valid images found in archive")]
    NoImages,

    #[error("failed to extract archive: {0:#}")]
    Extraction(anyhow::Error),

    #[error("failed to summarize chapter {chapter}: {source:#}")]
    Summarization {
        chapter: String,
        source: anyhow::Error,
    },

    #[error("failed to embed chapter {chapter}: {source:#}")]
    Embedding {
        chapter: String,
        source: anyhow::Error,
    },

    #[error("failed to index chapter {chapter}: {source:#}")]
    Storage {
        chapter: String,
        source: anyhow::Error,
    },

    #[error("{stage} failed: {source:#}")]
    Io {
        stage: ProcessingStage,
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn io(stage: ProcessingStage, source: impl Into<anyhow::Error>) -> Self {
        PipelineError::Io {
            stage,
            source: source.into(),
        }
    }

    pub fn stage(&self) -> ProcessingStage {
        match self {
            PipelineError::NoImages | PipelineError::Extraction(_) => ProcessingStage::Extraction,
            PipelineError::Summarization { .. } => ProcessingStage::Summarization,
            PipelineError::Embedding { .. } => ProcessingStage::Embedding,
            PipelineError::Storage { .. } => ProcessingStage::Storage,
            PipelineError::Io { stage, .. } => *stage,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(PipelineError::NoImages.to_string(), "no valid images found in archive");

        let err = PipelineError::Summarization {
            chapter: "ch1".into(),
            source: anyhow::anyhow!("timeout"),
        };
        assert_eq!(err.to_string(), "failed to summarize chapter ch1: timeout");
        assert_eq!(err.stage(), ProcessingStage::Summarization);
    }
}
