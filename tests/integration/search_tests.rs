use anyhow::Result;
use std::fs;

use comicrag::library::Catalog;
use comicrag::search::UNKNOWN_TITLE;

use crate::helpers::fixtures::comic_zip;
use crate::helpers::test_harness::TestHarness;

async fn ingest(harness: &TestHarness, file: &str, pages: &[&str]) -> Result<()> {
    use comicrag::tasks::JobProcessor;
    harness.submit(file, &comic_zip(pages), None);
    let job = harness.queue.pop().unwrap();
    harness.processor().process(job).await
}

/// Text the pipeline embedded for a chapter
fn indexed_text(harness: &TestHarness, hash: &str, chapter: &str) -> String {
    fs::read_to_string(harness.library().summary_path(hash, chapter))
        .unwrap()
        .replace('\n', " ")
}

fn hash_of(harness: &TestHarness, name: &str) -> String {
    let library = harness.library();
    library
        .comic_hashes()
        .unwrap()
        .into_iter()
        .find(|h| library.read_info(h).unwrap().name == name)
        .unwrap()
}

#[tokio::test]
async fn test_exact_chapter_text_ranks_its_comic_first() -> Result<()> {
    let harness = TestHarness::new();
    ingest(&harness, "sea.zip", &["Sea/ch1/wave.png", "Sea/ch2/ship.png"]).await?;
    ingest(&harness, "sand.zip", &["Sand/ch1/dune.png"]).await?;

    let sand = hash_of(&harness, "Sand");
    let query = indexed_text(&harness, &sand, "ch1");

    let results = harness.search().search(&query, 10).await?;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].title, "Sand");
    assert_eq!(results[0].hash, sand);
    assert_eq!(results[0].matched_chapters.len(), 1);
    assert!((results[0].matched_chapters[0].similarity - 1.0).abs() < 1e-6);

    assert_eq!(results[1].title, "Sea");
    let chapters: Vec<&str> = results[1]
        .matched_chapters
        .iter()
        .map(|c| c.chapter.as_str())
        .collect();
    assert_eq!(chapters, vec!["ch1", "ch2"]);
    let total: f64 = results[1].matched_chapters.iter().map(|c| c.similarity).sum();
    assert!((results[1].relevance - total).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_k_limits_chapters_considered() -> Result<()> {
    let harness = TestHarness::new();
    ingest(&harness, "sea.zip", &["Sea/ch1/wave.png", "Sea/ch2/ship.png"]).await?;

    let results = harness.search().search("anything", 1).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].matched_chapters.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_titles_follow_renames_and_missing_info() -> Result<()> {
    let harness = TestHarness::new();
    ingest(&harness, "sand.zip", &["Sand/ch1/dune.png"]).await?;
    let hash = hash_of(&harness, "Sand");

    let catalog = Catalog::new(harness.library(), harness.index.clone(), harness.store.clone());
    catalog.update_name(&hash, "Desert")?;
    let results = harness.search().search("dunes", 5).await?;
    assert_eq!(results[0].title, "Desert");

    fs::remove_file(harness.library().info_path(&hash))?;
    let results = harness.search().search("dunes", 5).await?;
    assert_eq!(results[0].title, UNKNOWN_TITLE);
    Ok(())
}
