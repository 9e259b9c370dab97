//! Streaming text generation: page image analysis and chapter summaries

pub mod mock;
mod openai;
mod retry;

pub use openai::{OpenAIAnalyzer, OpenAISummarizer};
pub use retry::RetryPolicy;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Incremental model output. An `Err` item ends the attempt.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Prompt sent with every page image
pub const PAGE_PROMPT: &str = "Describe the key content of this comic page in detail: \
art style, characters, actions and dialogue. Be concise but complete.";

/// System instruction for chapter digests
pub const DIGEST_INSTRUCTION: &str = "You are an assistant who is good at summarizing. \
From the following per-page descriptions of a comic chapter, produce a coherent chapter \
digest used for embedding keyword search. Output only keywords and key sentences that \
summarize complex events (used for event matching), in this format:\n\
keyword\nkeyword\nkeyword\n\nKey sentences:\nsentence\nsentence\nsentence";

/// One page handed to the image analyzer
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Original file name inside the archive
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl PageImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_for(&name);
        Self { name, bytes, mime }
    }
}

/// MIME type from a file extension, defaulting to PNG
pub fn mime_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "image/png",
    }
}

/// Turns one page image into a streamed description
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, page: &PageImage) -> Result<TextStream>;
}

/// Streams a summary of `text` under the given system instruction
#[async_trait]
pub trait TextSummarizer: Send + Sync {
    async fn summarize(&self, system: &str, text: &str) -> Result<TextStream>;
}
