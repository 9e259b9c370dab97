//! Deterministic stand-ins for the model services, used in tests and offline runs

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ImageAnalyzer, PageImage, TextStream, TextSummarizer};
use crate::embeddings::EmbeddingProvider;

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Refuse the call before streaming
    Reject,
    /// Stream one chunk, then error
    BreakMidway,
}

#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight(Arc<Concurrency>);

impl InFlight {
    fn enter(c: &Arc<Concurrency>) -> Self {
        let now = c.current.fetch_add(1, Ordering::SeqCst) + 1;
        c.peak.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(c))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Describes each page as `description of <file name>`, streamed word by word.
///
/// Faults can be scripted per page name for a number of attempts, or forever.
#[derive(Default)]
pub struct ScriptedAnalyzer {
    chunk_delay: Duration,
    faults: Mutex<HashMap<String, (Fault, Option<u32>)>>,
    calls: AtomicUsize,
    concurrency: Arc<Concurrency>,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep between streamed chunks
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Reject the first `times` calls for `page`
    pub fn fail_first(self, page: &str, times: u32) -> Self {
        self.script(page, Fault::Reject, Some(times))
    }

    /// Break the stream after one chunk on the first `times` calls for `page`
    pub fn break_midway(self, page: &str, times: u32) -> Self {
        self.script(page, Fault::BreakMidway, Some(times))
    }

    /// Reject every call for `page`
    pub fn always_fail(self, page: &str) -> Self {
        self.script(page, Fault::Reject, None)
    }

    fn script(self, page: &str, fault: Fault, times: Option<u32>) -> Self {
        self.faults
            .lock()
            .unwrap()
            .insert(page.to_string(), (fault, times));
        self
    }

    /// The description a successful call for `page` produces
    pub fn description_for(page: &str) -> String {
        format!("description of {}", page)
    }

    /// Total analyze calls, including failed attempts
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of streams open at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.concurrency.peak.load(Ordering::SeqCst)
    }

    fn take_fault(&self, page: &str) -> Option<Fault> {
        let mut faults = self.faults.lock().unwrap();
        let (fault, remaining) = faults.get_mut(page)?;
        match remaining {
            None => Some(*fault),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(*fault)
            }
        }
    }
}

#[async_trait]
impl ImageAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, page: &PageImage) -> Result<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fault = self.take_fault(&page.name);
        if let Some(Fault::Reject) = fault {
            return Err(anyhow!("vision service unavailable for {}", page.name));
        }

        let guard = InFlight::enter(&self.concurrency);
        let delay = self.chunk_delay;
        let words: Vec<String> = Self::description_for(&page.name)
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let broken = matches!(fault, Some(Fault::BreakMidway));

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for (i, word) in words.into_iter().enumerate() {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if broken && i == 1 {
                    yield Err(anyhow!("connection reset"));
                    return;
                }
                yield Ok(word);
            }
        }))
    }
}

/// Produces `digest: <first line of each description>` and records its inputs
#[derive(Default)]
pub struct ScriptedSummarizer {
    fail: bool,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A summarizer whose every call errors
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Texts received so far, in call order
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn digest_of(text: &str) -> String {
        let lines: Vec<&str> = text.split("\n\n").collect();
        format!("digest:\n{}", lines.join("\n"))
    }
}

#[async_trait]
impl TextSummarizer for ScriptedSummarizer {
    async fn summarize(&self, _system: &str, text: &str) -> Result<TextStream> {
        self.inputs.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(anyhow!("summary model unavailable"));
        }

        let digest = Self::digest_of(text);
        let parts: Vec<String> = digest.split_inclusive('\n').map(str::to_string).collect();
        Ok(Box::pin(futures::stream::iter(parts.into_iter().map(Ok))))
    }
}

/// Hash-seeded unit vectors with optional pinned vectors for exact texts
pub struct HashEmbedder {
    dimension: usize,
    pinned: HashMap<String, Vec<f32>>,
    fail: bool,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            pinned: HashMap::new(),
            fail: false,
        }
    }

    /// Return `vector` whenever exactly `text` is embedded
    pub fn pin(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.to_string(), vector);
        self
    }

    /// An embedder whose every call errors
    pub fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    fn text_to_vector(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.pinned.get(text) {
            return v.clone();
        }

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut seed = hasher.finish();

        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            vector.push(((seed / 65536) % 1000) as f32 / 1000.0);
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in vector.iter_mut() {
                *v /= magnitude;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(anyhow!("embedding service unavailable"));
        }
        Ok(texts.iter().map(|t| self.text_to_vector(t)).collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(anyhow!("embedding service unavailable"));
        }
        Ok(self.text_to_vector(query))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &'static str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(mut stream: TextStream) -> (String, bool) {
        let mut text = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => text.push_str(&chunk),
                Err(_) => return (text, true),
            }
        }
        (text, false)
    }

    #[tokio::test]
    async fn test_analyzer_streams_description() {
        let analyzer = ScriptedAnalyzer::new();
        let stream = analyzer.analyze(&PageImage::new("p1.png", vec![])).await.unwrap();

        assert_eq!(collect(stream).await, ("description of p1.png".to_string(), false));
        assert_eq!(analyzer.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_analyzer_scripted_faults() {
        let analyzer = ScriptedAnalyzer::new()
            .fail_first("a.png", 1)
            .break_midway("b.png", 1);

        assert!(analyzer.analyze(&PageImage::new("a.png", vec![])).await.is_err());
        assert!(analyzer.analyze(&PageImage::new("a.png", vec![])).await.is_ok());

        let broken = analyzer.analyze(&PageImage::new("b.png", vec![])).await.unwrap();
        assert_eq!(collect(broken).await, ("description ".to_string(), true));
        assert_eq!(analyzer.calls(), 3);
    }

    #[tokio::test]
    async fn test_hash_embedder_deterministic_and_pinned() {
        let embedder = HashEmbedder::new(8).pin("q", vec![1.0; 8]);

        assert_eq!(
            embedder.embed_query("text").await.unwrap(),
            embedder.embed_query("text").await.unwrap()
        );
        assert_eq!(embedder.embed_query("q").await.unwrap(), vec![1.0; 8]);

        let v = embedder.embed_query("other").await.unwrap();
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_documents_are_flattened_before_embedding() {
        let embedder = HashEmbedder::new(4);
        assert_eq!(
            embedder.embed_document("first\nsecond").await.unwrap(),
            embedder.embed_query("first second").await.unwrap()
        );
        assert!(HashEmbedder::failing(4).embed_document("x").await.is_err());
    }

    #[tokio::test]
    async fn test_summarizer_records_inputs() {
        let summarizer = ScriptedSummarizer::new();
        let stream = summarizer.summarize("sys", "one\n\ntwo").await.unwrap();

        assert_eq!(collect(stream).await.0, "digest:\none\ntwo");
        assert_eq!(summarizer.inputs(), vec!["one\n\ntwo"]);
    }
}
