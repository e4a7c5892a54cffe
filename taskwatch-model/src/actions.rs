//! Request and response bodies for the action endpoints.

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, TaskId};

/// Response from a task-starting action.
///
/// A missing `task_id` means the backend finished the work synchronously.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskAccepted {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskAccepted {
    /// The task id, ignoring blank values some endpoints emit.
    pub fn tracked_task(&self) -> Option<&TaskId> {
        self.task_id.as_ref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDownloadRequest {
    #[serde(alias = "manga_ids")]
    pub entity_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDownloadSummary {
    pub success: bool,
    pub message: String,
    pub total: u64,
    pub success_count: u64,
    pub failed_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_titles: Option<Vec<String>>,
}
