use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::analysis::{summarize_chapter, PageAnalysis};
use super::archive::{comic_root, extract_zip};
use super::chapters::{discover_chapters, ensure_cover, ChapterSource, ImageFilter};
use super::errors::{PipelineError, PipelineResult, ProcessingStage};
use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::generation::{ImageAnalyzer, RetryPolicy, TextSummarizer};
use crate::library::{page_stem, write_json_atomic, Area, ComicIndex, ComicInfo, Library};
use crate::metrics::{TASKS_COMPLETED, TASKS_FAILED};
use crate::storage::{ChapterEntry, VectorIndex};
use crate::tasks::{Job, JobProcessor, TaskStatus, TaskStore, TaskUpdate};

/// Share of the progress bar covered by page analysis; the rest is reserved
/// for the final summary of the last chapter and completion.
const ANALYSIS_PROGRESS_SHARE: f64 = 95.0;

/// External services the pipeline talks to
#[derive(Clone)]
pub struct Backends {
    pub analyzer: Arc<dyn ImageAnalyzer>,
    pub summarizer: Arc<dyn TextSummarizer>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
}

/// Turns one uploaded archive into library files and vector entries
pub struct ArchiveProcessor {
    library: Library,
    temp_dir: PathBuf,
    filter: ImageFilter,
    store: Arc<TaskStore>,
    backends: Backends,
    retry: RetryPolicy,
    max_concurrency: usize,
}

/// Where a comic lands in the library
struct Allocation {
    hash: String,
    existing: bool,
}

impl ArchiveProcessor {
    pub fn new(config: &Config, store: Arc<TaskStore>, backends: Backends) -> Self {
        Self {
            library: Library::new(&config.library.data_dir),
            temp_dir: config.library.temp_dir.clone(),
            filter: ImageFilter::new(&config.library),
            store,
            backends,
            retry: RetryPolicy::new(config.analysis.max_attempts, config.retry_delay()),
            max_concurrency: config.analysis.max_concurrency.max(1),
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    fn extraction_dir(&self, job: &Job) -> PathBuf {
        self.temp_dir.join(&job.task_id)
    }

    fn report(&self, job: &Job, update: TaskUpdate) {
        self.store.update(&job.task_id, update);
    }

    /// Run every stage of the pipeline for one job
    pub async fn run(&self, job: &Job) -> PipelineResult<()> {
        self.report(
            job,
            TaskUpdate::status(TaskStatus::Processing).with_details("extracting archive"),
        );

        let archive = job.archive_path.clone();
        let dest = self.extraction_dir(job);
        let root = blocking(move || {
            let files = extract_zip(&archive, &dest)?;
            debug!(files, "Archive extracted");
            comic_root(&dest)
        })
        .await
        .map_err(PipelineError::Extraction)?;

        let allocation = self.allocate(job).await?;
        let hash = allocation.hash;
        info!(
            task_id = %job.task_id,
            comic = %job.comic_name,
            hash = %hash,
            update = allocation.existing,
            "Comic allocated"
        );

        let cover = self.library.cover_path(&hash);
        let filter = self.filter.clone();
        let cover_root = root.clone();
        blocking(move || ensure_cover(&cover_root, &cover, &filter))
            .await
            .map_err(|e| PipelineError::io(ProcessingStage::Cover, e))?;

        let filter = self.filter.clone();
        let discover_root = root.clone();
        let chapters = blocking(move || discover_chapters(&discover_root, &filter))
            .await
            .map_err(PipelineError::Extraction)?;

        let total_pages: usize = chapters.iter().map(|c| c.pages.len()).sum();
        if total_pages == 0 {
            return Err(PipelineError::NoImages);
        }
        info!(
            task_id = %job.task_id,
            chapters = chapters.len(),
            pages = total_pages,
            "Chapters discovered"
        );

        let mut processed = 0;
        let count = chapters.len();
        for (i, chapter) in chapters.iter().enumerate() {
            self.process_chapter(job, &hash, chapter, i + 1, count, &mut processed, total_pages)
                .await?;
        }

        Ok(())
    }

    /// Reuse the hash already mapped to the comic name, or register the
    /// archive's content hash under it. The source archive is deleted once
    /// the comic has a place in the library.
    async fn allocate(&self, job: &Job) -> PipelineResult<Allocation> {
        let library = self.library.clone();
        let name = job.comic_name.clone();
        let content_hash = job.content_hash.clone();
        let archive = job.archive_path.clone();

        blocking(move || {
            let allocation = ComicIndex::update(&library, |index| match index.get(&name) {
                Some(hash) => Allocation {
                    hash: hash.to_string(),
                    existing: true,
                },
                None => {
                    index.insert(name.as_str(), content_hash.as_str());
                    Allocation {
                        hash: content_hash,
                        existing: false,
                    }
                }
            })?;

            if !library.info_path(&allocation.hash).exists() {
                library.write_info(&allocation.hash, &ComicInfo { name })?;
            }

            if archive.exists() {
                fs::remove_file(&archive)
                    .with_context(|| format!("Failed to delete archive {:?}", archive))?;
            }
            Ok(allocation)
        })
        .await
        .map_err(|e| PipelineError::io(ProcessingStage::Allocation, e))
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_chapter(
        &self,
        job: &Job,
        hash: &str,
        chapter: &ChapterSource,
        position: usize,
        count: usize,
        processed: &mut usize,
        total_pages: usize,
    ) -> PipelineResult<()> {
        let name = chapter.name.as_str();
        if chapter.pages.is_empty() {
            warn!(task_id = %job.task_id, chapter = name, "Chapter has no page images, skipping");
            return Ok(());
        }
        info!(
            task_id = %job.task_id,
            chapter = name,
            pages = chapter.pages.len(),
            "Processing chapter {}/{}",
            position,
            count
        );

        let pages_dir = self.place_pages(hash, chapter).await?;

        let analysis = PageAnalysis {
            task_id: &job.task_id,
            chapter: name,
            store: &self.store,
            analyzer: self.backends.analyzer.as_ref(),
            retry: self.retry,
        };
        let outcomes = analysis
            .run(&pages_dir, &chapter.pages, self.max_concurrency, |_| {
                *processed += 1;
                let progress = *processed as f64 / total_pages as f64 * ANALYSIS_PROGRESS_SHARE;
                self.report(
                    job,
                    TaskUpdate::status(TaskStatus::AIProcessing)
                        .with_progress(progress)
                        .with_details(format!(
                            "chapter {} ({}/{}): analyzed {}/{} pages",
                            name, position, count, processed, total_pages
                        )),
                );
            })
            .await;

        let mut by_file: HashMap<String, String> = outcomes
            .into_iter()
            .filter_map(|o| o.description.map(|d| (o.file, d)))
            .collect();

        // Manifest order, failed pages left out
        let mut descriptions = Vec::with_capacity(by_file.len());
        for page in &chapter.pages {
            if let Some(text) = by_file.remove(page) {
                let path = self.library.description_path(hash, name, page_stem(page));
                tokio::fs::write(&path, &text)
                    .await
                    .with_context(|| format!("Failed to write description {:?}", path))
                    .map_err(|e| PipelineError::io(ProcessingStage::Analysis, e))?;
                descriptions.push(text);
            }
        }

        if descriptions.is_empty() {
            warn!(
                task_id = %job.task_id,
                chapter = name,
                "No page of the chapter could be analyzed, skipping summary"
            );
            return Ok(());
        }

        self.report(
            job,
            TaskUpdate::status(TaskStatus::AIProcessing)
                .with_details(format!("summarizing chapter {}", name)),
        );
        let summary = summarize_chapter(
            &self.store,
            &job.task_id,
            name,
            self.backends.summarizer.as_ref(),
            &descriptions.join("\n\n"),
        )
        .await
        .map_err(|source| PipelineError::Summarization {
            chapter: name.to_string(),
            source,
        })?;

        let summary_path = self.library.summary_path(hash, name);
        write_text(&summary_path, &summary)
            .await
            .map_err(|e| PipelineError::io(ProcessingStage::Summarization, e))?;

        self.index_chapter(hash, name, summary).await
    }

    /// Replace the chapter's previous files, write its manifest and move the
    /// page images into the library. Returns the pages directory.
    async fn place_pages(&self, hash: &str, chapter: &ChapterSource) -> PipelineResult<PathBuf> {
        let library = self.library.clone();
        let hash = hash.to_string();
        let chapter = chapter.clone();

        blocking(move || {
            library.remove_chapter(&hash, &chapter.name, &Area::ALL)?;
            write_json_atomic(&library.manifest_path(&hash, &chapter.name), &chapter.pages)?;

            let pages_dir = library.chapter_dir(&hash, Area::Pages, &chapter.name);
            fs::create_dir_all(&pages_dir)
                .with_context(|| format!("Failed to create {:?}", pages_dir))?;
            for page in &chapter.pages {
                move_file(&chapter.dir.join(page), &pages_dir.join(page))?;
            }
            Ok(pages_dir)
        })
        .await
        .map_err(|e| PipelineError::io(ProcessingStage::Extraction, e))
    }

    async fn index_chapter(&self, hash: &str, chapter: &str, summary: String) -> PipelineResult<()> {
        let vector = self
            .backends
            .embedder
            .embed_document(&summary)
            .await
            .map_err(|source| PipelineError::Embedding {
                chapter: chapter.to_string(),
                source,
            })?;

        let entry = ChapterEntry::new(hash, chapter, summary, vector);
        self.backends
            .index
            .upsert(entry)
            .await
            .map_err(|source| PipelineError::Storage {
                chapter: chapter.to_string(),
                source,
            })?;
        debug!(hash, chapter, "Chapter indexed");
        Ok(())
    }

    /// Remove the extraction directory and the archive, whatever the outcome
    async fn cleanup(&self, job: &Job) {
        let dir = self.extraction_dir(job);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(task_id = %job.task_id, "Removed {:?}", dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(task_id = %job.task_id, "Failed to remove {:?}: {}", dir, e),
        }

        match tokio::fs::remove_file(&job.archive_path).await {
            Ok(()) => debug!(task_id = %job.task_id, "Removed archive {:?}", job.archive_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                task_id = %job.task_id,
                "Failed to remove archive {:?}: {}", job.archive_path, e
            ),
        }
    }
}

#[async_trait]
impl JobProcessor for ArchiveProcessor {
    async fn process(&self, job: Job) -> Result<()> {
        info!(task_id = %job.task_id, archive = ?job.archive_path, "Processing archive");
        let result = self.run(&job).await;
        self.cleanup(&job).await;

        match result {
            Ok(()) => {
                self.report(
                    &job,
                    TaskUpdate::status(TaskStatus::Completed).with_details("all chapters processed"),
                );
                TASKS_COMPLETED.inc();
                info!(task_id = %job.task_id, "Archive processed");
            }
            Err(e) => {
                error!(task_id = %job.task_id, stage = %e.stage(), "Archive processing failed: {}", e);
                self.report(
                    &job,
                    TaskUpdate::status(TaskStatus::Failed).with_details(e.to_string()),
                );
                TASKS_FAILED.inc();
            }
        }
        Ok(())
    }
}

/// Run filesystem work off the async runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Blocking task panicked")?
}

async fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}

/// Rename, falling back to copy and delete across filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).with_context(|| format!("Failed to copy {:?} to {:?}", from, to))?;
    fs::remove_file(from).with_context(|| format!("Failed to remove {:?}", from))?;
    Ok(())
}
