use anyhow::Result;

use comicrag::commands::check::gate;
use comicrag::consistency::{check, reconcile};
use comicrag::storage::{chapter_id, ChapterEntry, VectorIndex};
use comicrag::tasks::JobProcessor;

use crate::helpers::fixtures::comic_zip;
use crate::helpers::test_harness::TestHarness;

async fn ingest_saga(harness: &TestHarness) -> Result<String> {
    harness.submit(
        "saga.zip",
        &comic_zip(&["Saga/ch1/1.png", "Saga/ch2/1.png"]),
        None,
    );
    let job = harness.queue.pop().unwrap();
    let hash = job.content_hash.clone();
    harness.processor().process(job).await?;
    Ok(hash)
}

#[tokio::test]
async fn test_processed_library_is_consistent() -> Result<()> {
    let harness = TestHarness::new();
    ingest_saga(&harness).await?;

    let report = check(&harness.library(), harness.index.as_ref()).await?;
    assert!(report.is_consistent());
    gate(&harness.library(), harness.index.as_ref(), false).await?;
    Ok(())
}

#[tokio::test]
async fn test_divergence_blocks_startup_until_reconciled() -> Result<()> {
    let harness = TestHarness::new();
    let hash = ingest_saga(&harness).await?;

    // Lose one vector and gain a stray one
    harness.index.delete(&chapter_id(&hash, "ch2")).await?;
    harness
        .index
        .upsert(ChapterEntry::new("stray", "ch9", "text".into(), vec![0.0; 8]))
        .await?;

    let library = harness.library();
    let report = check(&library, harness.index.as_ref()).await?;
    assert_eq!(
        report.only_in_filesystem.iter().cloned().collect::<Vec<_>>(),
        vec![format!("{}/ch2", hash)]
    );
    assert_eq!(
        report.only_in_index.iter().cloned().collect::<Vec<_>>(),
        vec!["stray/ch9".to_string()]
    );

    assert!(gate(&library, harness.index.as_ref(), false).await.is_err());

    reconcile(&library, harness.index.as_ref(), &report).await?;
    assert!(!library.summary_path(&hash, "ch2").exists());
    assert!(library.summary_path(&hash, "ch1").exists());
    assert_eq!(harness.index.count().await?, 1);
    gate(&library, harness.index.as_ref(), false).await?;
    Ok(())
}
