//! In-memory status store shared by the queue, the processor and observers

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::status::{StreamBuffer, StreamEntry, TaskRecord, TaskStatus, TaskUpdate, TaskView};

/// Per-task records and their named stream buffers.
///
/// All mutation happens under one mutex that is never held across an await.
/// Every append or update signals [`TaskStore::subscribe_changes`].
#[derive(Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<String, TaskRecord>>,
    changed: Arc<Notify>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskRecord>> {
        // A panic while holding this lock leaves the map in a consistent state
        // (every mutation is a single insert or push), so poisoning is ignored.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a record, replacing any previous one with the same id
    pub fn insert(&self, record: TaskRecord) {
        debug!(task_id = %record.task_id, "Tracking task");
        self.lock().insert(record.task_id.clone(), record);
        self.changed.notify_waiters();
    }

    /// Insert a record unless its id is already tracked. Returns whether it was inserted.
    pub fn insert_if_absent(&self, record: TaskRecord) -> bool {
        let mut tasks = self.lock();
        if tasks.contains_key(&record.task_id) {
            return false;
        }
        debug!(task_id = %record.task_id, "Tracking task");
        tasks.insert(record.task_id.clone(), record);
        drop(tasks);
        self.changed.notify_waiters();
        true
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.lock().contains_key(task_id)
    }

    /// Merge an update into a task record.
    ///
    /// Terminal records are left untouched, backward status moves and
    /// decreasing progress are dropped, and progress only reaches 100 together
    /// with `Completed`. Returns whether the record exists.
    pub fn update(&self, task_id: &str, update: TaskUpdate) -> bool {
        let mut tasks = self.lock();
        let Some(record) = tasks.get_mut(task_id) else {
            warn!(task_id, "Status update for unknown task");
            return false;
        };

        if record.status.is_terminal() {
            warn!(
                task_id,
                status = %record.status,
                "Ignoring update for finished task"
            );
            return true;
        }

        if let Some(next) = update.status {
            if record.status.can_transition_to(next) {
                record.status = next;
            } else {
                warn!(task_id, from = %record.status, to = %next, "Ignoring backward status change");
            }
        }

        if let Some(progress) = update.progress {
            let progress = progress.clamp(0.0, 100.0);
            if progress < record.progress {
                debug!(task_id, progress, current = record.progress, "Ignoring lower progress");
            } else if progress >= 100.0 && record.status != TaskStatus::Completed {
                debug!(task_id, "Holding progress below 100 until completion");
            } else {
                record.progress = progress;
            }
        }

        if let Some(details) = update.details {
            record.details = details;
        }

        match record.status {
            TaskStatus::Completed => {
                record.progress = 100.0;
                record.end_time = Some(Utc::now());
            }
            TaskStatus::Failed => {
                record.end_time = Some(Utc::now());
            }
            _ => {}
        }

        drop(tasks);
        self.changed.notify_waiters();
        true
    }

    /// Create an empty stream on first reference. False for an unknown task.
    pub fn get_or_create_stream(&self, task_id: &str, stream_id: &str) -> bool {
        let mut tasks = self.lock();
        match tasks.get_mut(task_id) {
            Some(record) => {
                record.streams.entry(stream_id.to_string()).or_default();
                true
            }
            None => false,
        }
    }

    /// Append one entry, creating the stream if needed
    pub fn append(&self, task_id: &str, stream_id: &str, entry: StreamEntry) {
        let mut tasks = self.lock();
        let Some(record) = tasks.get_mut(task_id) else {
            warn!(task_id, stream_id, "Append to unknown task");
            return;
        };
        record
            .streams
            .entry(stream_id.to_string())
            .or_default()
            .push(entry);
        drop(tasks);
        self.changed.notify_waiters();
    }

    /// Entries of one stream from `offset` to the current end
    pub fn read_stream(&self, task_id: &str, stream_id: &str, offset: usize) -> Vec<StreamEntry> {
        self.lock()
            .get(task_id)
            .and_then(|r| r.streams.get(stream_id))
            .map(|buf| buf.since(offset).to_vec())
            .unwrap_or_default()
    }

    /// Status and stream ids of a task, read together
    pub fn stream_state(&self, task_id: &str) -> Option<(TaskStatus, Vec<String>)> {
        self.lock()
            .get(task_id)
            .map(|r| (r.status, r.streams.keys().cloned().collect()))
    }

    /// Copy every buffer of a task in one step
    pub fn snapshot_streams(&self, task_id: &str) -> Option<HashMap<String, StreamBuffer>> {
        self.lock().get(task_id).map(|r| r.streams.clone())
    }

    pub fn get(&self, task_id: &str) -> Option<TaskView> {
        self.lock().get(task_id).map(TaskRecord::view)
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.lock().get(task_id).map(|r| r.status)
    }

    /// Every task, newest first
    pub fn list_all(&self) -> Vec<TaskView> {
        let mut views: Vec<TaskView> = self.lock().values().map(TaskRecord::view).collect();
        views.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        views
    }

    pub fn remove(&self, task_id: &str) -> bool {
        let removed = self.lock().remove(task_id).is_some();
        if removed {
            self.changed.notify_waiters();
        }
        removed
    }

    /// Handle signalled on every change to the store
    pub fn subscribe_changes(&self) -> Arc<Notify> {
        Arc::clone(&self.changed)
    }
}
