//! Task records and the entries of their streaming buffers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Lifecycle of a processing task.
///
/// Variants are declared in transition order; the derived `Ord` is what the
/// store uses to reject backward moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Processing,
    #[serde(rename = "AI_Processing")]
    AIProcessing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskStatus::Failed => true,
            _ => next >= self,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "Queued"),
            TaskStatus::Processing => write!(f, "Processing"),
            TaskStatus::AIProcessing => write!(f, "AI_Processing"),
            TaskStatus::Completed => write!(f, "Completed"),
            TaskStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One element of a stream buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEntry {
    Chunk(String),
    End { error: bool },
}

impl StreamEntry {
    pub fn chunk(text: impl Into<String>) -> Self {
        StreamEntry::Chunk(text.into())
    }

    pub fn is_end(&self) -> bool {
        matches!(self, StreamEntry::End { .. })
    }
}

/// Append-only sequence of entries for one stream id
#[derive(Debug, Clone, Default)]
pub struct StreamBuffer {
    entries: Vec<StreamEntry>,
}

impl StreamBuffer {
    pub fn push(&mut self, entry: StreamEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Entries from `offset` up to the current end. Out-of-range offsets yield nothing.
    pub fn since(&self, offset: usize) -> &[StreamEntry] {
        self.entries.get(offset..).unwrap_or(&[])
    }

    pub fn is_finished(&self) -> bool {
        self.entries.iter().any(StreamEntry::is_end)
    }

    /// Concatenated text of every chunk
    pub fn text(&self) -> String {
        self.entries
            .iter()
            .filter_map(|e| match e {
                StreamEntry::Chunk(s) => Some(s.as_str()),
                StreamEntry::End { .. } => None,
            })
            .collect()
    }
}

/// Full task state held by the store
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: String,
    pub filename: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub details: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub streams: HashMap<String, StreamBuffer>,
}

impl TaskRecord {
    /// A freshly submitted task
    pub fn queued(task_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            filename: filename.into(),
            status: TaskStatus::Queued,
            progress: 0.0,
            details: "waiting for a worker".to_string(),
            start_time: Utc::now(),
            end_time: None,
            streams: HashMap::new(),
        }
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            task_id: self.task_id.clone(),
            filename: self.filename.clone(),
            status: self.status,
            progress: self.progress,
            details: self.details.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Task state without stream buffers, as exposed over HTTP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    pub task_id: String,
    pub filename: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub details: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Partial update merged into a task record
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub details: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A queued unit of work
#[derive(Debug, Clone)]
pub struct Job {
    pub task_id: String,
    /// Name the archive was uploaded under, shown in status listings
    pub filename: String,
    pub archive_path: PathBuf,
    pub comic_name: String,
    /// sha256 hex digest of the archive
    pub content_hash: String,
}
