use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use comicrag::generation::mock::ScriptedAnalyzer;
use comicrag::generation::{ImageAnalyzer, PageImage, TextStream};
use comicrag::storage::VectorIndex;
use comicrag::tasks::{JobProcessor, TaskStatus, TaskStore};

use crate::helpers::fixtures::{comic_zip, text_only_zip};
use crate::helpers::test_harness::TestHarness;

/// Records the task's status and progress whenever a page analysis starts
struct ProgressProbe {
    inner: ScriptedAnalyzer,
    store: Arc<TaskStore>,
    seen: Mutex<Vec<(TaskStatus, f64)>>,
}

#[async_trait]
impl ImageAnalyzer for ProgressProbe {
    async fn analyze(&self, page: &PageImage) -> Result<TextStream> {
        if let Some(view) = self.store.list_all().first() {
            self.seen.lock().unwrap().push((view.status, view.progress));
        }
        self.inner.analyze(page).await
    }
}

const SAGA: &[&str] = &[
    "Saga/ch1/1.png",
    "Saga/ch1/2.png",
    "Saga/ch1/3.png",
    "Saga/ch2/1.png",
    "Saga/ch2/2.png",
];

#[tokio::test]
async fn test_end_to_end_progress_sequence() -> Result<()> {
    let probe: Arc<Mutex<Option<Arc<ProgressProbe>>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&probe);
    let mut harness = TestHarness::build(move |store| {
        let p = Arc::new(ProgressProbe {
            inner: ScriptedAnalyzer::new(),
            store,
            seen: Mutex::new(Vec::new()),
        });
        *slot.lock().unwrap() = Some(Arc::clone(&p));
        p
    });
    harness.config.analysis.max_concurrency = 1;
    let probe = probe.lock().unwrap().clone().unwrap();

    let task_id = harness.submit("saga.zip", &comic_zip(SAGA), None);
    let queued = harness.store.get(&task_id).unwrap();
    assert_eq!(queued.status, TaskStatus::Queued);
    assert_eq!(queued.filename, "saga.zip");

    let job = harness.queue.pop().unwrap();
    harness.processor().process(job).await?;

    let seen = probe.seen.lock().unwrap().clone();
    let progress: Vec<f64> = seen.iter().map(|(_, p)| *p).collect();
    let expected = [0.0, 19.0, 38.0, 57.0, 76.0];
    assert_eq!(progress.len(), expected.len());
    for (got, want) in progress.iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "progress {} != {}", got, want);
    }
    assert_eq!(seen[0].0, TaskStatus::Processing);
    assert!(seen[1..].iter().all(|(s, _)| *s == TaskStatus::AIProcessing));

    let done = harness.store.get(&task_id).unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress, 100.0);
    assert_eq!(done.details, "all chapters processed");
    assert!(done.end_time.is_some());

    let library = harness.library();
    let hashes = library.comic_hashes()?;
    assert_eq!(hashes.len(), 1);
    assert_eq!(library.read_info(&hashes[0])?.name, "Saga");
    assert_eq!(library.summarized_chapters(&hashes[0])?, vec!["ch1", "ch2"]);
    assert_eq!(harness.index.count().await?, 2);

    let summary = fs::read_to_string(library.summary_path(&hashes[0], "ch1"))?;
    assert_eq!(
        summary,
        "digest:\ndescription of 1.png\ndescription of 2.png\ndescription of 3.png"
    );

    // Scratch space and the uploaded archive are gone
    assert!(!harness.config.library.temp_dir.join(&task_id).exists());
    assert!(!harness.config.library.upload_dir.join(&task_id).exists());
    Ok(())
}

#[tokio::test]
async fn test_resubmission_with_same_name_updates_in_place() -> Result<()> {
    let harness = TestHarness::new();
    let pool = harness.start_workers();

    let first = harness.submit("saga.zip", &comic_zip(SAGA), Some("Saga"));
    harness.wait_finished(&first).await?;

    let second = harness.submit(
        "saga-v2.zip",
        &comic_zip(&["Saga/ch1/1.png", "Saga/ch1/2.png"]),
        Some("Saga"),
    );
    let view = harness.wait_finished(&second).await?;
    assert_eq!(view.status, TaskStatus::Completed);

    let library = harness.library();
    assert_eq!(library.comic_hashes()?.len(), 1);
    // ch1 replaced, ch2 untouched, no duplicate entries
    assert_eq!(harness.index.count().await?, 2);
    let hash = &library.comic_hashes()?[0];
    let summary = fs::read_to_string(library.summary_path(hash, "ch1"))?;
    assert!(!summary.contains("3.png"));

    pool.shutdown();
    pool.join().await;
    Ok(())
}

#[tokio::test]
async fn test_page_fan_out_is_bounded() -> Result<()> {
    let analyzer = Arc::new(ScriptedAnalyzer::new().with_chunk_delay(Duration::from_millis(5)));
    let mut harness = TestHarness::with_analyzer(analyzer.clone());
    harness.config.analysis.max_concurrency = 2;

    let pages: Vec<String> = (1..=6).map(|i| format!("Wide/{}.png", i)).collect();
    let pages: Vec<&str> = pages.iter().map(String::as_str).collect();
    harness.submit("wide.zip", &comic_zip(&pages), None);

    let job = harness.queue.pop().unwrap();
    harness.processor().process(job).await?;

    assert_eq!(analyzer.calls(), 6);
    assert!(analyzer.peak_in_flight() <= 2);
    assert!(analyzer.peak_in_flight() >= 1);
    Ok(())
}

#[tokio::test]
async fn test_transient_failures_are_retried() -> Result<()> {
    let analyzer = Arc::new(
        ScriptedAnalyzer::new()
            .fail_first("1.png", 1)
            .break_midway("2.png", 1),
    );
    let harness = TestHarness::with_analyzer(analyzer.clone());
    let task_id = harness.submit("retry.zip", &comic_zip(&["Retry/1.png", "Retry/2.png"]), None);

    let job = harness.queue.pop().unwrap();
    harness.processor().process(job).await?;

    assert_eq!(harness.store.get(&task_id).unwrap().status, TaskStatus::Completed);
    assert_eq!(analyzer.calls(), 4);
    let library = harness.library();
    let hash = &library.comic_hashes()?[0];
    let summary = fs::read_to_string(library.summary_path(hash, "."))?;
    assert_eq!(summary, "digest:\ndescription of 1.png\ndescription of 2.png");
    Ok(())
}

#[tokio::test]
async fn test_archive_without_images_fails_task() -> Result<()> {
    let harness = TestHarness::new();
    let pool = harness.start_workers();

    let task_id = harness.submit("empty.zip", &text_only_zip(), None);
    let view = harness.wait_finished(&task_id).await?;
    assert_eq!(view.status, TaskStatus::Failed);
    assert!(view.details.contains("no valid images"));
    assert!(view.progress < 100.0);
    assert_eq!(harness.index.count().await?, 0);

    pool.shutdown();
    pool.join().await;
    Ok(())
}
