use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::PushMessage;
use crate::config::StreamConfig;
use crate::natural::sort_natural;
use crate::tasks::{StreamEntry, TaskStore};

/// Turns the stream buffers of a task into a sequence of push messages
#[derive(Clone)]
pub struct StreamPublisher {
    store: Arc<TaskStore>,
    poll_interval: Duration,
    replay_finished: bool,
}

impl StreamPublisher {
    pub fn new(store: Arc<TaskStore>, config: &StreamConfig) -> Self {
        Self {
            store,
            poll_interval: config.poll_interval(),
            replay_finished: config.replay_finished_streams,
        }
    }

    /// Follow one task until it is finished or removed.
    ///
    /// Unfinished buffers are first replayed as history, then every new
    /// entry is pushed as it is appended. The stream always ends with
    /// [`PushMessage::Close`].
    pub fn subscribe(&self, task_id: &str) -> impl Stream<Item = PushMessage> + Send + 'static {
        let store = Arc::clone(&self.store);
        let poll_interval = self.poll_interval;
        let replay_finished = self.replay_finished;
        let task_id = task_id.to_string();

        async_stream::stream! {
            let changes = store.subscribe_changes();

            let Some(snapshot) = store.snapshot_streams(&task_id) else {
                debug!(task_id = %task_id, "Subscription to unknown task");
                yield PushMessage::error(format!("task {} not found", task_id));
                yield PushMessage::Close;
                return;
            };

            let mut ids: Vec<String> = snapshot.keys().cloned().collect();
            sort_natural(&mut ids);

            let mut offsets: HashMap<String, usize> = HashMap::new();
            for id in ids {
                let buffer = &snapshot[&id];
                offsets.insert(id.clone(), buffer.len());
                if buffer.is_finished() && !replay_finished {
                    continue;
                }
                let content = buffer.text();
                if !content.is_empty() {
                    yield PushMessage::History { stream_id: id, content };
                }
            }

            loop {
                let notified = changes.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                // Read the status before draining so a terminal task's last
                // entries are still delivered
                let Some((status, mut current)) = store.stream_state(&task_id) else {
                    debug!(task_id = %task_id, "Task removed while subscribed");
                    break;
                };

                if let Some(missing) = offsets.keys().find(|id| !current.contains(id)) {
                    error!(task_id = %task_id, stream_id = %missing, "Stream buffer vanished");
                    yield PushMessage::error(format!(
                        "internal error: stream {} disappeared",
                        missing
                    ));
                    break;
                }
                sort_natural(&mut current);

                let mut delivered = false;
                for id in current {
                    let offset = offsets.get(&id).copied().unwrap_or(0);
                    let entries = store.read_stream(&task_id, &id, offset);
                    offsets.insert(id.clone(), offset + entries.len());

                    for entry in entries {
                        delivered = true;
                        yield match entry {
                            StreamEntry::Chunk(content) => PushMessage::Content {
                                stream_id: id.clone(),
                                content,
                            },
                            StreamEntry::End { error } => PushMessage::StreamEnd {
                                stream_id: id.clone(),
                                error,
                            },
                        };
                    }
                }

                if status.is_terminal() {
                    break;
                }
                if !delivered {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }

            yield PushMessage::Close;
        }
    }
}
