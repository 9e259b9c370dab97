//! HTTP server command.
//!
//! Checks the library against the vector index, starts the worker pool and
//! serves the HTTP API until Ctrl-C.

use anyhow::Result;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};

use super::{check, Services};
use crate::config::Config;
use crate::library::Catalog;
use crate::search::ComicSearch;
use crate::tasks::{JobProcessor, TaskQueue, WorkerPool};
use crate::web::{AppState, WebServer};

/// Run the serve command
///
/// # Arguments
///
/// * `port` - Overrides `server.port`
/// * `reconcile` - Repair library/index divergence instead of refusing to start
pub async fn run(port: Option<u16>, reconcile: bool) -> Result<()> {
    let root = env::current_dir()?;
    let mut config = Config::load(&root)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let services = Services::open(config).await?;
    check::startup_gate(
        services.config.storage.backend,
        &services.library,
        services.index.as_ref(),
        reconcile,
    )
    .await?;

    let config = Arc::clone(&services.config);
    let processor: Arc<dyn JobProcessor> = services.processor()?;
    let queue = Arc::new(TaskQueue::new(Arc::clone(&services.store)));
    let pool = WorkerPool::start(
        config.workers.pool_size,
        Arc::clone(&queue),
        processor,
        config.workers.idle_poll(),
    );

    let search = Arc::new(ComicSearch::new(
        services.library.clone(),
        Arc::clone(&services.index),
        Arc::clone(&services.embedder),
    ));
    let catalog = Arc::new(Catalog::new(
        services.library.clone(),
        Arc::clone(&services.index),
        Arc::clone(&services.store),
    ));

    let state = AppState::new(config, queue, search, catalog);
    let result = WebServer::new(state).start(shutdown_signal()).await;

    info!("Waiting for running jobs to finish");
    pool.shutdown();
    pool.join().await;
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
