//! Model calls whose output is mirrored into task stream buffers

use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;
use tracing::{debug, error, info};

use crate::generation::{ImageAnalyzer, PageImage, RetryPolicy, TextSummarizer, DIGEST_INSTRUCTION};
use crate::library::page_stem;
use crate::metrics::PAGES_ANALYZED;
use crate::tasks::{StreamEntry, TaskStore};

/// Result of analyzing one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub file: String,
    /// `None` when every attempt failed
    pub description: Option<String>,
}

/// Stream id of a page: `<chapter>_<page stem>`
pub fn page_stream_id(chapter: &str, file: &str) -> String {
    format!("{}_{}", chapter, page_stem(file))
}

/// Stream id of a chapter summary
pub fn summary_stream_id(chapter: &str) -> String {
    format!("summary_{}", chapter)
}

/// Shared context for the analysis of one chapter's pages
pub struct PageAnalysis<'a> {
    pub task_id: &'a str,
    pub chapter: &'a str,
    pub store: &'a TaskStore,
    pub analyzer: &'a dyn ImageAnalyzer,
    pub retry: RetryPolicy,
}

impl PageAnalysis<'_> {
    /// Analyze every page with at most `max_concurrency` calls in flight,
    /// calling `on_done` as each page finishes (in completion order).
    pub async fn run<F>(&self, dir: &Path, pages: &[String], max_concurrency: usize, mut on_done: F) -> Vec<PageOutcome>
    where
        F: FnMut(&PageOutcome),
    {
        let mut outcomes = Vec::with_capacity(pages.len());
        let analyses: Vec<_> = pages.iter().map(|file| self.analyze_page(dir, file)).collect();
        let mut pending = futures::stream::iter(analyses).buffer_unordered(max_concurrency.max(1));

        while let Some(outcome) = pending.next().await {
            on_done(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Analyze one page into its own stream. Failures are recorded in the
    /// stream and reported as a missing description.
    pub async fn analyze_page(&self, dir: &Path, file: &str) -> PageOutcome {
        let stream_id = page_stream_id(self.chapter, file);
        self.store.get_or_create_stream(self.task_id, &stream_id);
        self.store.append(
            self.task_id,
            &stream_id,
            StreamEntry::chunk(format!("[analyzing page: {}]\n", file)),
        );
        info!(task_id = self.task_id, chapter = self.chapter, page = file, "Analyzing page");

        let result = match tokio::fs::read(dir.join(file))
            .await
            .with_context(|| format!("Failed to read page {}", file))
        {
            Ok(bytes) => {
                let page = PageImage::new(file, bytes);
                let label = format!("analysis of {}/{}", self.chapter, file);
                self.retry
                    .run(&label, |attempt| self.attempt(&page, &stream_id, attempt))
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(description) => {
                self.store.append(
                    self.task_id,
                    &stream_id,
                    StreamEntry::chunk(format!("\n[page analysis finished: {}]\n\n", file)),
                );
                self.store
                    .append(self.task_id, &stream_id, StreamEntry::End { error: false });
                PAGES_ANALYZED.inc();
                PageOutcome {
                    file: file.to_string(),
                    description: Some(description),
                }
            }
            Err(e) => {
                error!(task_id = self.task_id, page = file, "Page analysis failed: {:#}", e);
                self.store.append(
                    self.task_id,
                    &stream_id,
                    StreamEntry::chunk(format!("\n[error: {:#}]\n", e)),
                );
                self.store
                    .append(self.task_id, &stream_id, StreamEntry::End { error: true });
                PageOutcome {
                    file: file.to_string(),
                    description: None,
                }
            }
        }
    }

    /// One call to the analyzer. Chunks reach the stream as they arrive;
    /// only a complete stream becomes the description.
    async fn attempt(&self, page: &PageImage, stream_id: &str, attempt: u32) -> Result<String> {
        debug!(task_id = self.task_id, page = %page.name, attempt, "Analysis attempt");
        let mut stream = self.analyzer.analyze(page).await?;
        let mut text = String::new();
        while let Some(item) = stream.next().await {
            let chunk = item?;
            self.store
                .append(self.task_id, stream_id, StreamEntry::Chunk(chunk.clone()));
            text.push_str(&chunk);
        }
        Ok(text)
    }
}

/// Stream a chapter summary into `summary_<chapter>` and return its text
pub async fn summarize_chapter(
    store: &TaskStore,
    task_id: &str,
    chapter: &str,
    summarizer: &dyn TextSummarizer,
    descriptions: &str,
) -> Result<String> {
    let stream_id = summary_stream_id(chapter);
    store.get_or_create_stream(task_id, &stream_id);
    store.append(task_id, &stream_id, StreamEntry::chunk("[summary started]\n"));

    let result = async {
        let mut stream = summarizer.summarize(DIGEST_INSTRUCTION, descriptions).await?;
        let mut summary = String::new();
        while let Some(item) = stream.next().await {
            let chunk = item?;
            store.append(task_id, &stream_id, StreamEntry::Chunk(chunk.clone()));
            summary.push_str(&chunk);
        }
        Ok::<_, anyhow::Error>(summary)
    }
    .await;

    match result {
        Ok(summary) => {
            store.append(task_id, &stream_id, StreamEntry::chunk("\n[summary finished]\n"));
            store.append(task_id, &stream_id, StreamEntry::End { error: false });
            Ok(summary)
        }
        Err(e) => {
            store.append(task_id, &stream_id, StreamEntry::chunk(format!("\n[error: {:#}]\n", e)));
            store.append(task_id, &stream_id, StreamEntry::End { error: true });
            Err(e)
        }
    }
}
