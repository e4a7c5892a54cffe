use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity;
use crate::ids::{EntityId, TaskId, TaskType};
use crate::status::TaskStatus;
use crate::timestamp;

/// Where an update entered the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateSource {
    /// Named event on the shared push stream.
    Stream,
    /// Periodic fallback poll while the stream is degraded.
    Poll,
    /// One-shot pull: a target gained its first subscriber, or a pushed
    /// task arrived without its entity references.
    Seed,
    /// Recorded locally right after submitting an action.
    Local,
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateSource::Stream => "stream",
            UpdateSource::Poll => "poll",
            UpdateSource::Seed => "seed",
            UpdateSource::Local => "local",
        };
        f.write_str(label)
    }
}

/// Partial (or full) task fields as delivered by the stream or a poll.
///
/// Only `id` is mandatory. Stream envelopes name it `task_id`, task bodies
/// name it `id`; entity references may still use the legacy `manga_*` keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(alias = "task_id")]
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(
        default,
        alias = "manga_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub entity_id: Option<EntityId>,
    #[serde(
        default,
        alias = "manga_ids",
        deserialize_with = "entity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub entity_ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, task_type: impl Into<TaskType>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }
}

/// Canonical client-side snapshot of one background job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub progress: u8,
    pub total_items: Option<u64>,
    pub completed_items: Option<u64>,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub entity_id: Option<EntityId>,
    pub entity_ids: Option<Vec<EntityId>>,
    pub result_data: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Build the first snapshot for an id, defaulting whatever the update
    /// leaves out (`pending`, progress 0).
    pub fn from_update(update: &TaskUpdate) -> Self {
        let mut record = Self {
            id: update.id.clone(),
            task_type: TaskType::default(),
            status: TaskStatus::Pending,
            progress: 0,
            total_items: None,
            completed_items: None,
            message: None,
            error_message: None,
            entity_id: None,
            entity_ids: None,
            result_data: None,
            created_at: None,
            updated_at: None,
            completed_at: None,
        };
        record.absorb(update);
        record
    }

    /// Apply the fields carried by `update`.
    ///
    /// Ordering and lifecycle checks are the caller's job; this only enforces
    /// the write-once fields: the task type and the entity references keep
    /// the first value observed.
    pub fn absorb(&mut self, update: &TaskUpdate) {
        if self.task_type.is_unknown()
            && let Some(task_type) = &update.task_type
            && !task_type.is_unknown()
        {
            self.task_type = task_type.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = clamp_progress(progress);
        }
        if update.total_items.is_some() {
            self.total_items = update.total_items;
        }
        if update.completed_items.is_some() {
            self.completed_items = update.completed_items;
        }
        if update.message.is_some() {
            self.message.clone_from(&update.message);
        }
        if update.error_message.is_some() {
            self.error_message.clone_from(&update.error_message);
        }
        if update.result_data.is_some() {
            self.result_data.clone_from(&update.result_data);
        }

        if self.entity_id.is_none()
            && let Some(entity_id) = &update.entity_id
            && !entity_id.is_empty()
        {
            self.entity_id = Some(entity_id.clone());
        }
        if self.entity_ids.is_none()
            && let Some(entity_ids) = &update.entity_ids
            && !entity_ids.is_empty()
        {
            self.entity_ids = Some(entity_ids.clone());
        }

        if self.created_at.is_none() {
            self.created_at = update.created_at;
        }
        if let Some(updated_at) = update.updated_at
            && self.updated_at.is_none_or(|stored| updated_at > stored)
        {
            self.updated_at = Some(updated_at);
        }
        if update.completed_at.is_some() {
            self.completed_at = update.completed_at;
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// All entity ids this task acts upon, single and batch references alike.
    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.entity_id
            .iter()
            .chain(self.entity_ids.iter().flatten())
    }

    pub fn touches(&self, entity: &EntityId) -> bool {
        self.entities().any(|candidate| candidate == entity)
    }
}

fn clamp_progress(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    progress.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn new_records_default_to_pending_without_progress() {
        let record = TaskRecord::from_update(&TaskUpdate::new("t1"));
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.progress, 0);
        assert!(record.task_type.is_unknown());
        assert_eq!(record.entities().count(), 0);
    }

    #[test]
    fn entity_and_type_are_write_once() {
        let mut record = TaskRecord::from_update(
            &TaskUpdate::new("t1").with_type("download").with_entity("e1"),
        );

        record.absorb(
            &TaskUpdate::new("t1").with_type("sync").with_entity("e2"),
        );

        assert_eq!(record.task_type, TaskType::download());
        assert_eq!(record.entity_id, Some(EntityId::from("e1")));
    }

    #[test]
    fn entity_fills_when_first_observation_lacked_it() {
        let mut record = TaskRecord::from_update(
            &TaskUpdate::new("t1")
                .with_type("download")
                .with_status(TaskStatus::Pending),
        );
        assert!(record.entity_id.is_none());

        record.absorb(&TaskUpdate::new("t1").with_entity("e7"));
        assert!(record.touches(&EntityId::from("e7")));
    }

    #[test]
    fn progress_is_clamped() {
        let mut record = TaskRecord::from_update(&TaskUpdate::new("t1"));
        record.absorb(&TaskUpdate::new("t1").with_progress(180.0));
        assert_eq!(record.progress, 100);
        record.absorb(&TaskUpdate::new("t1").with_progress(-4.0));
        assert_eq!(record.progress, 0);
        record.absorb(&TaskUpdate::new("t1").with_progress(39.6));
        assert_eq!(record.progress, 40);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let mut record = TaskRecord::from_update(
            &TaskUpdate::new("t1").with_updated_at(at(100)),
        );
        record.absorb(&TaskUpdate::new("t1").with_updated_at(at(90)));
        assert_eq!(record.updated_at, Some(at(100)));
    }

    #[test]
    fn decodes_polled_body_with_legacy_names() {
        let body = r#"{
            "id": "7f0c",
            "task_type": "download",
            "status": "running",
            "progress": 40,
            "total_items": null,
            "completed_items": 0,
            "message": "downloading",
            "manga_id": "m-42",
            "manga_ids": "[\"m-42\", \"m-43\"]",
            "created_at": "2024-05-01T12:00:00",
            "updated_at": "2024-05-01T12:00:05.5",
            "completed_at": null
        }"#;

        let update: TaskUpdate = serde_json::from_str(body).expect("body");
        assert_eq!(update.id, TaskId::from("7f0c"));
        assert_eq!(update.entity_id, Some(EntityId::from("m-42")));
        assert_eq!(
            update.entity_ids,
            Some(vec![EntityId::from("m-42"), EntityId::from("m-43")])
        );
        assert!(update.updated_at.is_some());
        assert!(update.completed_at.is_none());

        let record = TaskRecord::from_update(&update);
        assert_eq!(record.entities().count(), 3);
        assert_eq!(record.progress, 40);
    }
}
