//! Process archives from the command line without the HTTP server.

use anyhow::{bail, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{check, Services};
use crate::config::Config;
use crate::indexing::StagedArchive;
use crate::tasks::{JobProcessor, TaskQueue, TaskStatus, TaskStore, WorkerPool};

const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Run the submit command
///
/// # Arguments
///
/// * `archives` - Zip files to process
/// * `name` - Display name; only meaningful with a single archive
pub async fn run(archives: Vec<PathBuf>, name: Option<String>, reconcile: bool) -> Result<()> {
    if archives.is_empty() {
        bail!("No archives given");
    }
    if name.is_some() && archives.len() > 1 {
        bail!("--name can only be used with a single archive");
    }

    let root = env::current_dir()?;
    let config = Config::load(&root)?;
    let services = Services::open(config).await?;
    check::startup_gate(
        services.config.storage.backend,
        &services.library,
        services.index.as_ref(),
        reconcile,
    )
    .await?;

    let processor: Arc<dyn JobProcessor> = services.processor()?;
    let queue = Arc::new(TaskQueue::new(Arc::clone(&services.store)));
    let pool = WorkerPool::start(
        services.config.workers.pool_size,
        Arc::clone(&queue),
        processor,
        services.config.workers.idle_poll(),
    );

    let multi = MultiProgress::new();
    let mut tracked = Vec::new();
    for archive in &archives {
        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid archive path {:?}", archive))?;
        let staged = StagedArchive::new(&services.config.library.upload_dir, file_name)?;
        staged.copy_from(archive)?;
        let job = staged.into_job(name.as_deref())?;

        let task_id = job.task_id.clone();
        let label = job.comic_name.clone();
        if !queue.submit(job) {
            warn!(task_id = %task_id, "Skipping duplicate submission of {:?}", archive);
            continue;
        }
        tracked.push((task_id, create_progress_bar(&multi, &label)));
    }

    let failures = watch_tasks(&services.store, &tracked).await;

    pool.shutdown();
    pool.join().await;

    if failures > 0 {
        bail!("{} of {} archives failed", failures, tracked.len());
    }
    println!("✓ Processed {} archives", tracked.len());
    Ok(())
}

/// Mirror task progress onto the bars until every task is terminal.
/// Returns the number of failed tasks.
async fn watch_tasks(store: &TaskStore, tracked: &[(String, ProgressBar)]) -> usize {
    loop {
        let mut pending = 0;
        let mut failures = 0;
        for (task_id, bar) in tracked {
            let Some(view) = store.get(task_id) else {
                continue;
            };
            bar.set_position(view.progress.round() as u64);
            bar.set_message(view.details.clone());
            match view.status {
                TaskStatus::Completed => bar.finish_with_message("done"),
                TaskStatus::Failed => {
                    failures += 1;
                    bar.abandon_with_message(format!("failed: {}", view.details));
                }
                _ => pending += 1,
            }
        }
        if pending == 0 {
            return failures;
        }
        tokio::time::sleep(REFRESH_INTERVAL).await;
    }
}

fn create_progress_bar(multi: &MultiProgress, label: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(100));
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] {}: [{{bar:40.cyan/blue}}] {{pos}}% {{msg}}",
            label.replace(['{', '}'], "")
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}
