//! Live view of in-flight model output for remote observers

mod publisher;

pub use publisher::StreamPublisher;

use serde_json::json;

/// Stream id used for messages that are not tied to a task stream
pub const ERROR_STREAM: &str = "error";

/// One message pushed to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// Text a stream produced before the subscription started
    History { stream_id: String, content: String },
    Content { stream_id: String, content: String },
    StreamEnd { stream_id: String, error: bool },
    /// Last message of every subscription
    Close,
}

impl PushMessage {
    pub fn error(content: impl Into<String>) -> Self {
        PushMessage::Content {
            stream_id: ERROR_STREAM.to_string(),
            content: content.into(),
        }
    }

    /// SSE event name; `None` for the default `message` event
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            PushMessage::Close => Some("close"),
            _ => None,
        }
    }

    /// Payload of the SSE `data` field
    pub fn to_sse_data(&self) -> String {
        match self {
            PushMessage::History { stream_id, content } => json!({
                "stream_id": stream_id,
                "content": content,
                "is_history": true,
            })
            .to_string(),
            PushMessage::Content { stream_id, content } => json!({
                "stream_id": stream_id,
                "content": content,
            })
            .to_string(),
            PushMessage::StreamEnd { stream_id, error } => {
                let mut value = json!({
                    "type": "stream_end",
                    "stream_id": stream_id,
                });
                if *error {
                    value["error"] = json!(true);
                }
                value.to_string()
            }
            PushMessage::Close => "Task finished".to_string(),
        }
    }
}
