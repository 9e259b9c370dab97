//! Background task tracking: status records, streaming buffers, queue and workers

pub mod queue;
pub mod status;
pub mod store;

pub use queue::{JobProcessor, TaskQueue, WorkerPool};
pub use status::{Job, StreamBuffer, StreamEntry, TaskRecord, TaskStatus, TaskUpdate, TaskView};
pub use store::TaskStore;
