use anyhow::Result;
use std::env;

use super::Services;
use crate::search::ComicSearch;
use crate::Config;

/// Run the search command
pub async fn run(query: &str, limit: Option<usize>) -> Result<()> {
    let root = env::current_dir()?;
    let config = Config::load(&root)?;
    let limit = limit.unwrap_or(config.search.default_limit);

    let services = Services::open(config).await?;
    let search = ComicSearch::new(
        services.library.clone(),
        services.index.clone(),
        services.embedder.clone(),
    );

    let results = search.search(query, limit).await?;
    if results.is_empty() {
        println!("No comics found for: {}", query);
        return Ok(());
    }

    println!("Found {} comics for: \"{}\"\n", results.len(), query);
    for (i, comic) in results.iter().enumerate() {
        println!(
            "{}. {} [{}] (relevance: {:.3})",
            i + 1,
            comic.title,
            short_hash(&comic.hash),
            comic.relevance
        );
        for chapter in &comic.matched_chapters {
            println!("     {} ({:.3})", chapter.chapter, chapter.similarity);
        }
    }

    Ok(())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
