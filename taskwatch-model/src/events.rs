use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskUpdate;
use crate::timestamp;

/// Event names published on the task stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    Connected,
    TaskCreated,
    TaskUpdated,
}

impl StreamEventKind {
    pub const CONNECTED: &'static str = "connected";
    pub const TASK_CREATED: &'static str = "task_created";
    pub const TASK_UPDATED: &'static str = "task_updated";

    /// Resolve an SSE event name. Unknown names yield `None` and are ignored
    /// by the stream client.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            Self::CONNECTED => Some(StreamEventKind::Connected),
            Self::TASK_CREATED => Some(StreamEventKind::TaskCreated),
            Self::TASK_UPDATED => Some(StreamEventKind::TaskUpdated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamEventKind::Connected => Self::CONNECTED,
            StreamEventKind::TaskCreated => Self::TASK_CREATED,
            StreamEventKind::TaskUpdated => Self::TASK_UPDATED,
        }
    }
}

/// JSON payload carried by `task_created` / `task_updated` events.
///
/// The envelope timestamp is when the backend emitted the event; update
/// payloads rarely carry their own `updated_at`, so the envelope time stands
/// in for it during merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEventEnvelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub data: TaskUpdate,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TaskEventEnvelope {
    pub fn into_update(self) -> TaskUpdate {
        let mut update = self.data;
        if update.updated_at.is_none() {
            update.updated_at = self.timestamp;
        }
        update
    }
}
