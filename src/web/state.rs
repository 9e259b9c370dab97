//! Shared state handed to every request handler

use std::sync::Arc;

use crate::config::Config;
use crate::library::Catalog;
use crate::live::StreamPublisher;
use crate::search::ComicSearch;
use crate::tasks::{TaskQueue, TaskStore};

/// Cloned per request; everything heavy sits behind an `Arc`
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: Arc<TaskQueue>,
    pub publisher: StreamPublisher,
    pub search: Arc<ComicSearch>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        queue: Arc<TaskQueue>,
        search: Arc<ComicSearch>,
        catalog: Arc<Catalog>,
    ) -> Self {
        let publisher = StreamPublisher::new(queue.store().clone(), &config.stream);
        Self {
            config,
            queue,
            publisher,
            search,
            catalog,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        self.queue.store()
    }
}
