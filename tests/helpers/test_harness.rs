use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use comicrag::generation::mock::{HashEmbedder, ScriptedAnalyzer, ScriptedSummarizer};
use comicrag::generation::ImageAnalyzer;
use comicrag::indexing::{ArchiveProcessor, Backends, StagedArchive};
use comicrag::library::{Catalog, Library};
use comicrag::search::ComicSearch;
use comicrag::storage::MemoryIndex;
use comicrag::tasks::{Job, TaskQueue, TaskStore, TaskView, WorkerPool};
use comicrag::web::AppState;
use comicrag::Config;

pub const DIMENSION: usize = 8;

/// Library, queue and scripted model services rooted in a temp directory
pub struct TestHarness {
    pub temp_dir: TempDir,
    pub config: Config,
    pub store: Arc<TaskStore>,
    pub queue: Arc<TaskQueue>,
    pub index: Arc<MemoryIndex>,
    pub analyzer: Arc<dyn ImageAnalyzer>,
    pub summarizer: Arc<ScriptedSummarizer>,
    pub embedder: Arc<HashEmbedder>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_analyzer(Arc::new(ScriptedAnalyzer::new()))
    }

    pub fn with_analyzer(analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        Self::build(|_| analyzer)
    }

    /// `make_analyzer` gets the task store, for analyzers that observe it
    pub fn build<F>(make_analyzer: F) -> Self
    where
        F: FnOnce(Arc<TaskStore>) -> Arc<dyn ImageAnalyzer>,
    {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.library.data_dir = temp_dir.path().join("data");
        config.library.temp_dir = temp_dir.path().join("tmp");
        config.library.upload_dir = temp_dir.path().join("uploads");
        config.analysis.retry_delay_secs = 0;
        config.analysis.max_attempts = Some(2);
        config.workers.pool_size = 2;
        config.workers.idle_poll_ms = 10;
        config.stream.poll_interval_ms = 10;

        let store = Arc::new(TaskStore::new());
        let analyzer = make_analyzer(Arc::clone(&store));
        Self {
            queue: Arc::new(TaskQueue::new(Arc::clone(&store))),
            temp_dir,
            config,
            store,
            index: Arc::new(MemoryIndex::new()),
            analyzer,
            summarizer: Arc::new(ScriptedSummarizer::new()),
            embedder: Arc::new(HashEmbedder::new(DIMENSION)),
        }
    }

    pub fn library(&self) -> Library {
        Library::new(&self.config.library.data_dir)
    }

    pub fn processor(&self) -> Arc<ArchiveProcessor> {
        Arc::new(ArchiveProcessor::new(
            &self.config,
            Arc::clone(&self.store),
            Backends {
                analyzer: Arc::clone(&self.analyzer),
                summarizer: self.summarizer.clone(),
                embedder: self.embedder.clone(),
                index: self.index.clone(),
            },
        ))
    }

    pub fn start_workers(&self) -> WorkerPool {
        WorkerPool::start(
            self.config.workers.pool_size,
            Arc::clone(&self.queue),
            self.processor(),
            self.config.workers.idle_poll(),
        )
    }

    /// Write `bytes` to the upload directory and turn it into a job
    pub fn stage(&self, file_name: &str, bytes: &[u8], name: Option<&str>) -> Job {
        let staged = StagedArchive::new(&self.config.library.upload_dir, file_name).unwrap();
        staged.write(bytes).unwrap();
        staged.into_job(name).unwrap()
    }

    /// Stage and queue an archive, returning its task id
    pub fn submit(&self, file_name: &str, bytes: &[u8], name: Option<&str>) -> String {
        let job = self.stage(file_name, bytes, name);
        let task_id = job.task_id.clone();
        assert!(self.queue.submit(job));
        task_id
    }

    /// Poll until the task is Completed or Failed
    pub async fn wait_finished(&self, task_id: &str) -> Result<TaskView> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(view) = self.store.get(task_id) {
                if view.status.is_terminal() {
                    return Ok(view);
                }
            }
            if Instant::now() > deadline {
                bail!("task {} did not finish in time", task_id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn search(&self) -> ComicSearch {
        ComicSearch::new(self.library(), self.index.clone(), self.embedder.clone())
    }

    pub fn app_state(&self) -> AppState {
        let catalog = Catalog::new(self.library(), self.index.clone(), Arc::clone(&self.store));
        AppState::new(
            Arc::new(self.config.clone()),
            Arc::clone(&self.queue),
            Arc::new(self.search()),
            Arc::new(catalog),
        )
    }
}
