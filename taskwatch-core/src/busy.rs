//! Per-type sets of entities that have an in-flight task.
//!
//! Membership only gates UI affordances such as a duplicate "download"
//! button. Whether a task actually finished is answered by its record.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use taskwatch_model::{EntityId, TaskRecord, TaskType};
use tokio::sync::watch;

use crate::registry::RegistryObserver;

pub type BusySet = Arc<BTreeSet<EntityId>>;

/// Derives busy sets from registry notifications.
///
/// Attached to a [`TaskRegistry`](crate::registry::TaskRegistry) as an
/// observer, so a task turning terminal drops its entities within the same
/// merge that recorded the transition. Entities can also be held busy
/// locally, with [`hold`](Self::hold), while a request is in flight.
#[derive(Debug, Default)]
pub struct EntityBusyIndex {
    sets: Mutex<HashMap<TaskType, BusyEntry>>,
}

#[derive(Debug)]
struct BusyEntry {
    sender: watch::Sender<BusySet>,
    derived: BTreeSet<EntityId>,
    held: HashMap<EntityId, usize>,
}

impl Default for BusyEntry {
    fn default() -> Self {
        Self {
            sender: watch::channel(BusySet::default()).0,
            derived: BTreeSet::new(),
            held: HashMap::new(),
        }
    }
}

impl BusyEntry {
    fn publish(&self, task_type: &TaskType) {
        let next: BTreeSet<EntityId> = self
            .derived
            .iter()
            .chain(self.held.keys())
            .cloned()
            .collect();
        let changed = self.sender.send_if_modified(|current| {
            if **current == next {
                return false;
            }
            *current = Arc::new(next);
            true
        });
        if changed {
            debug!(
                "[EntityBusyIndex] {} busy set now has {} entit(ies)",
                task_type,
                self.sender.borrow().len()
            );
        }
    }
}

impl EntityBusyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities referenced by the non-terminal records in `records`.
    pub fn derive(records: &[Arc<TaskRecord>]) -> BTreeSet<EntityId> {
        records
            .iter()
            .filter(|record| !record.is_terminal())
            .flat_map(|record| record.entities().cloned())
            .collect()
    }

    pub fn watch(&self, task_type: &TaskType) -> watch::Receiver<BusySet> {
        self.sets
            .lock()
            .entry(task_type.clone())
            .or_default()
            .sender
            .subscribe()
    }

    pub fn busy(&self, task_type: &TaskType) -> BusySet {
        self.sets
            .lock()
            .get(task_type)
            .map(|entry| entry.sender.borrow().clone())
            .unwrap_or_default()
    }

    pub fn is_busy(&self, task_type: &TaskType, entity_id: &EntityId) -> bool {
        self.busy(task_type).contains(entity_id)
    }

    /// Mark `entity_ids` busy for `task_type` until the returned guard is
    /// dropped, whatever the registry says. Holds nest.
    pub fn hold(
        self: &Arc<Self>,
        task_type: &TaskType,
        entity_ids: &[EntityId],
    ) -> BusyHold {
        let mut sets = self.sets.lock();
        let entry = sets.entry(task_type.clone()).or_default();
        for entity_id in entity_ids {
            *entry.held.entry(entity_id.clone()).or_default() += 1;
        }
        entry.publish(task_type);

        BusyHold {
            index: Arc::clone(self),
            task_type: task_type.clone(),
            entity_ids: entity_ids.to_vec(),
        }
    }

    fn release(&self, task_type: &TaskType, entity_ids: &[EntityId]) {
        let mut sets = self.sets.lock();
        let Some(entry) = sets.get_mut(task_type) else {
            return;
        };
        for entity_id in entity_ids {
            if let Some(count) = entry.held.get_mut(entity_id) {
                *count -= 1;
                if *count == 0 {
                    entry.held.remove(entity_id);
                }
            }
        }
        entry.publish(task_type);
    }
}

impl RegistryObserver for EntityBusyIndex {
    fn on_type_changed(
        &self,
        task_type: &TaskType,
        records: &[Arc<TaskRecord>],
    ) {
        let mut sets = self.sets.lock();
        let entry = sets.entry(task_type.clone()).or_default();
        entry.derived = Self::derive(records);
        entry.publish(task_type);
    }
}

/// Local busy marking from [`EntityBusyIndex::hold`]. Released on drop.
#[derive(Debug)]
pub struct BusyHold {
    index: Arc<EntityBusyIndex>,
    task_type: TaskType,
    entity_ids: Vec<EntityId>,
}

impl Drop for BusyHold {
    fn drop(&mut self) {
        self.index.release(&self.task_type, &self.entity_ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TaskRegistry;
    use taskwatch_model::{TaskStatus, TaskUpdate, UpdateSource};

    fn attached() -> (TaskRegistry, Arc<EntityBusyIndex>) {
        let registry = TaskRegistry::default();
        let index = Arc::new(EntityBusyIndex::new());
        registry.add_observer(index.clone());
        (registry, index)
    }

    #[test]
    fn terminal_transition_clears_entity_in_same_merge() {
        let (registry, index) = attached();
        let download = TaskType::download();
        let mut busy = index.watch(&download);

        registry.merge(
            TaskUpdate::new("t1")
                .with_type(TaskType::DOWNLOAD)
                .with_status(TaskStatus::Running)
                .with_entity("e1"),
            UpdateSource::Stream,
        );
        assert!(busy.has_changed().expect("sender alive"));
        assert!(busy.borrow_and_update().contains(&EntityId::from("e1")));

        registry.merge(
            TaskUpdate::new("t1").with_status(TaskStatus::Failed),
            UpdateSource::Stream,
        );
        assert!(busy.borrow_and_update().is_empty());
        assert!(!index.is_busy(&download, &EntityId::from("e1")));
    }

    #[test]
    fn busy_set_is_scoped_per_type_and_covers_batches() {
        let (registry, index) = attached();
        let mut batch = TaskUpdate::new("t1")
            .with_type(TaskType::DOWNLOAD)
            .with_status(TaskStatus::Pending);
        batch.entity_ids = Some(vec!["e1".into(), "e2".into()]);
        registry.merge(batch, UpdateSource::Poll);
        registry.merge(
            TaskUpdate::new("s1")
                .with_type(TaskType::SYNC)
                .with_status(TaskStatus::Running)
                .with_entity("e9"),
            UpdateSource::Poll,
        );

        let downloads = index.busy(&TaskType::download());
        assert_eq!(
            downloads.iter().map(EntityId::as_str).collect::<Vec<_>>(),
            vec!["e1", "e2"]
        );
        assert!(index.is_busy(&TaskType::sync(), &EntityId::from("e9")));
    }

    #[test]
    fn unrelated_progress_does_not_republish() {
        let (registry, index) = attached();
        registry.merge(
            TaskUpdate::new("t1")
                .with_type(TaskType::DOWNLOAD)
                .with_status(TaskStatus::Running)
                .with_entity("e1"),
            UpdateSource::Stream,
        );
        let mut busy = index.watch(&TaskType::download());
        busy.mark_unchanged();

        registry.merge(
            TaskUpdate::new("t1").with_progress(70.0),
            UpdateSource::Stream,
        );
        assert!(!busy.has_changed().expect("sender alive"));
    }

    #[test]
    fn holds_overlay_the_derived_set_until_dropped() {
        let (registry, index) = attached();
        let download = TaskType::download();
        registry.merge(
            TaskUpdate::new("t1")
                .with_type(TaskType::DOWNLOAD)
                .with_status(TaskStatus::Running)
                .with_entity("e1"),
            UpdateSource::Stream,
        );

        let entities = [EntityId::from("e1"), EntityId::from("e2")];
        let outer = index.hold(&download, &entities);
        let inner = index.hold(&download, &entities[1..]);
        assert!(index.is_busy(&download, &EntityId::from("e2")));

        drop(outer);
        assert!(index.is_busy(&download, &EntityId::from("e2")), "nested");

        // e1 leaves with its task; e2 is only held
        registry.merge(
            TaskUpdate::new("t1").with_status(TaskStatus::Completed),
            UpdateSource::Stream,
        );
        assert!(!index.is_busy(&download, &EntityId::from("e1")));
        assert!(index.is_busy(&download, &EntityId::from("e2")));

        drop(inner);
        assert!(index.busy(&download).is_empty());
    }
}
