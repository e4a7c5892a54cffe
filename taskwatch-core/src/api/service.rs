//! Request/response seam between the synchronization layer and the backend.

use std::fmt::Debug;

use async_trait::async_trait;
use taskwatch_model::{
    BatchDownloadSummary, EntityId, TaskAccepted, TaskId, TaskType, TaskUpdate,
};

use crate::error::Result;

/// Plain HTTP calls the layer needs: point and list queries for polling,
/// plus the action endpoints that start tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiService: Send + Sync + Debug {
    /// Fetch one task by id. A missing task is `Ok(None)`, not an error.
    async fn fetch_task(&self, task_id: &TaskId) -> Result<Option<TaskUpdate>>;

    /// Fetch the non-terminal tasks, optionally filtered by type.
    async fn fetch_running_tasks(
        &self,
        task_type: Option<TaskType>,
    ) -> Result<Vec<TaskUpdate>>;

    async fn start_sync(&self) -> Result<TaskAccepted>;

    async fn start_recent_updates_sync(&self) -> Result<TaskAccepted>;

    /// Start a single-entity download. The response has no task id when the
    /// backend satisfied it synchronously.
    async fn start_download(&self, entity_id: &EntityId)
    -> Result<TaskAccepted>;

    /// Submit a batch download. Not task-tracked by this layer.
    async fn download_batch(
        &self,
        entity_ids: &[EntityId],
    ) -> Result<BatchDownloadSummary>;
}
