use anyhow::{bail, Result};
use std::env;
use tracing::info;

use crate::Config;

pub async fn run(force: bool) -> Result<()> {
    let root = env::current_dir()?;

    if Config::is_initialized(&root) && !force {
        bail!(
            "comicrag is already initialized in {:?} (use --force to overwrite)",
            Config::comicrag_dir(&root)
        );
    }

    let config = Config::default();
    config.save(&root)?;

    info!("Initialized comicrag in {:?}", Config::comicrag_dir(&root));
    println!(
        "✓ Created {} with default configuration",
        Config::comicrag_dir(&root).display()
    );
    println!("\nNext steps:");
    println!("  1. Edit .comicrag/config.toml or export OPENAI_API_KEY");
    println!("  2. Run 'comicrag serve' to accept uploads over HTTP");
    println!("  3. Or run 'comicrag submit <archive.zip>' to process archives locally");

    Ok(())
}
