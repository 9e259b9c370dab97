//! FIFO job queue and the fixed pool of workers draining it

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::status::{Job, TaskRecord, TaskStatus, TaskUpdate};
use super::store::TaskStore;
use crate::metrics;

/// Something that runs one job to completion.
///
/// Implementations report their own progress and final status to the store;
/// an `Err` or a panic is turned into a failed task by the worker.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: Job) -> anyhow::Result<()>;
}

/// Shared FIFO of pending jobs
pub struct TaskQueue {
    jobs: Mutex<VecDeque<Job>>,
    store: Arc<TaskStore>,
    wakeup: Notify,
}

impl TaskQueue {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            store,
            wakeup: Notify::new(),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Enqueue a job and register it as `Queued`.
    ///
    /// A task id the store already tracks is dropped with a warning and
    /// `false` is returned.
    pub fn submit(&self, job: Job) -> bool {
        let record = TaskRecord::queued(job.task_id.clone(), job.filename.clone());
        if !self.store.insert_if_absent(record) {
            warn!(task_id = %job.task_id, "Duplicate task submission ignored");
            return false;
        }

        let depth = {
            let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
            jobs.push_back(job);
            jobs.len()
        };

        metrics::TASKS_SUBMITTED.inc();
        metrics::QUEUE_DEPTH.set(depth as f64);
        self.wakeup.notify_one();
        true
    }

    /// Take the oldest job without waiting
    pub fn pop(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        let job = jobs.pop_front();
        metrics::QUEUE_DEPTH.set(jobs.len() as f64);
        job
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed set of workers, each running one job at a time
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `workers` tasks pulling from `queue`
    pub fn start(
        workers: usize,
        queue: Arc<TaskQueue>,
        processor: Arc<dyn JobProcessor>,
        idle_poll: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let workers = workers.max(1);
        info!("Starting {} processing workers", workers);

        let handles = (0..workers)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let processor = Arc::clone(&processor);
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(id, queue, processor, idle_poll, shutdown))
            })
            .collect();

        Self { handles, shutdown }
    }

    /// Stop taking new jobs. Running jobs finish normally.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every worker to exit after [`WorkerPool::shutdown`]
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker exited abnormally: {}", e);
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    queue: Arc<TaskQueue>,
    processor: Arc<dyn JobProcessor>,
    idle_poll: Duration,
    shutdown: CancellationToken,
) {
    debug!(worker = id, "Worker started");

    while !shutdown.is_cancelled() {
        let Some(job) = queue.pop() else {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = queue.wakeup.notified() => {}
                _ = tokio::time::sleep(idle_poll) => {}
            }
            continue;
        };

        let task_id = job.task_id.clone();
        info!(worker = id, task_id = %task_id, "Picked up task");
        run_job(&queue.store, Arc::clone(&processor), job).await;
    }

    debug!(worker = id, "Worker stopped");
}

/// Run one job in its own task so a panic is contained
async fn run_job(store: &TaskStore, processor: Arc<dyn JobProcessor>, job: Job) {
    let task_id = job.task_id.clone();
    let handle = tokio::spawn(async move { processor.process(job).await });

    let failure = match handle.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{:#}", e)),
        Err(join_err) => Some(panic_message(join_err)),
    };

    if let Some(message) = failure {
        error!(task_id = %task_id, "Task failed in worker: {}", message);
        metrics::TASKS_FAILED.inc();
        store.update(
            &task_id,
            TaskUpdate::status(TaskStatus::Failed).with_details(format!("worker error: {}", message)),
        );
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
