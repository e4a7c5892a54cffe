//! Entity references for pushed tasks.
//!
//! Stream payloads carry status and progress but never the entity a task
//! acts on, so a task first seen over a healthy stream would never enter a
//! busy set. [`EntityBackfill`] watches the registry and queues every
//! non-terminal record without entity references exactly once; the
//! subscription manager decides whether to fetch it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use taskwatch_model::{TaskId, TaskRecord, TaskType};
use tokio::sync::mpsc;

use crate::registry::RegistryObserver;

#[derive(Debug)]
pub(crate) struct EntityBackfill {
    /// Per type, the records currently lacking entities that were queued.
    queued: Mutex<HashMap<TaskType, HashSet<TaskId>>>,
    queue: mpsc::UnboundedSender<TaskId>,
}

impl EntityBackfill {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<TaskId>) {
        let (queue, receiver) = mpsc::unbounded_channel();
        let backfill = Self {
            queued: Mutex::new(HashMap::new()),
            queue,
        };
        (backfill, receiver)
    }
}

/// Whether `record` is unfinished and still has no entity references.
pub(crate) fn needs_backfill(record: &TaskRecord) -> bool {
    !record.is_terminal() && record.entities().next().is_none()
}

impl RegistryObserver for EntityBackfill {
    fn on_type_changed(
        &self,
        task_type: &TaskType,
        records: &[Arc<TaskRecord>],
    ) {
        let lacking: HashSet<TaskId> = records
            .iter()
            .filter(|record| needs_backfill(record))
            .map(|record| record.id.clone())
            .collect();

        let mut queued = self.queued.lock();
        let seen = queued.remove(task_type).unwrap_or_default();
        for task_id in lacking.difference(&seen) {
            if self.queue.send(task_id.clone()).is_err() {
                // nobody drains the queue any more
                return;
            }
        }
        if !lacking.is_empty() {
            queued.insert(task_type.clone(), lacking);
        }
    }
}
