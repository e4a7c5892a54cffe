//! Authoritative in-memory task state.
//!
//! Every update, whether pushed or polled, goes through [`TaskRegistry::merge`],
//! which holds the write lock for the whole read-decide-write cycle so two
//! merges for the same id can never interleave. Ordering is decided by the
//! record's own `updated_at`, never by arrival order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;
use taskwatch_model::{TaskId, TaskRecord, TaskType, TaskUpdate, UpdateSource};
use tokio::sync::watch;

use crate::config::RegistryConfig;

/// Records of one type, newest first.
pub type TypeSnapshot = Arc<Vec<Arc<TaskRecord>>>;

/// Result of a single merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First observation of this id.
    Inserted,
    /// Accepted and changed the stored record.
    Updated,
    /// Accepted but identical to what was stored.
    Unchanged,
    /// Older `updated_at` than the stored record.
    Stale,
    /// Would move the status backwards.
    Regressed,
    /// The record is already terminal and the update would change it.
    Terminal,
}

impl MergeOutcome {
    /// Whether subscribers were notified.
    pub fn is_applied(self) -> bool {
        matches!(self, MergeOutcome::Inserted | MergeOutcome::Updated)
    }
}

/// Synchronous hook invoked whenever the records of a type change.
///
/// Runs while the registry write lock is held, so implementations must be
/// quick and must not call back into the registry.
pub trait RegistryObserver: Send + Sync + Debug {
    fn on_type_changed(
        &self,
        task_type: &TaskType,
        records: &[Arc<TaskRecord>],
    );
}

pub struct TaskRegistry {
    inner: RwLock<RegistryInner>,
}

struct RegistryInner {
    active: HashMap<TaskId, Arc<TaskRecord>>,
    retired: HashMap<TaskId, Arc<TaskRecord>>,
    retired_order: VecDeque<TaskId>,
    retired_capacity: usize,
    task_watchers: HashMap<TaskId, watch::Sender<Option<Arc<TaskRecord>>>>,
    type_watchers: HashMap<TaskType, watch::Sender<TypeSnapshot>>,
    observers: Vec<Arc<dyn RegistryObserver>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TaskRegistry")
            .field("active", &inner.active.len())
            .field("retired", &inner.retired.len())
            .field("task_watchers", &inner.task_watchers.len())
            .field("type_watchers", &inner.type_watchers.len())
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl TaskRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                active: HashMap::new(),
                retired: HashMap::new(),
                retired_order: VecDeque::new(),
                retired_capacity: config.retired_capacity,
                task_watchers: HashMap::new(),
                type_watchers: HashMap::new(),
                observers: Vec::new(),
            }),
        }
    }

    /// Merge a partial or full update into the record for `update.id`.
    ///
    /// Absent records are created with `pending` / progress 0 for anything the
    /// update leaves out. Existing records accept the update only if its
    /// `updated_at` is not older than the stored one (an absent timestamp
    /// counts as a tie) and its status does not move backwards. Terminal
    /// records take no further changes at all.
    pub fn merge(
        &self,
        update: TaskUpdate,
        source: UpdateSource,
    ) -> MergeOutcome {
        if update.id.is_empty() {
            warn!(
                "[TaskRegistry] Ignoring {} update without a task id",
                source
            );
            return MergeOutcome::Unchanged;
        }

        let mut inner = self.inner.write();

        if let Some(existing) = inner.active.get(&update.id).cloned() {
            return match resolve(&existing, &update) {
                Ok(record) => {
                    let record = Arc::new(record);
                    inner.active.insert(record.id.clone(), record.clone());
                    inner.publish_record(&record);
                    inner.publish_type(&record.task_type);
                    MergeOutcome::Updated
                }
                Err(outcome) => {
                    log_rejection(&update, source, outcome);
                    outcome
                }
            };
        }

        // retired records are terminal, so they never accept a change
        if let Some(retired) = inner.retired.get(&update.id) {
            let outcome = resolve(retired, &update)
                .err()
                .unwrap_or(MergeOutcome::Terminal);
            log_rejection(&update, source, outcome);
            return outcome;
        }

        let record = Arc::new(TaskRecord::from_update(&update));
        debug!(
            "[TaskRegistry] Tracking task {} ({}) from {}",
            record.id, record.status, source
        );
        inner.active.insert(record.id.clone(), record.clone());
        inner.publish_record(&record);
        inner.publish_type(&record.task_type);
        MergeOutcome::Inserted
    }

    /// Point lookup across active and retired records.
    pub fn get(&self, task_id: &TaskId) -> Option<Arc<TaskRecord>> {
        let inner = self.inner.read();
        inner
            .active
            .get(task_id)
            .or_else(|| inner.retired.get(task_id))
            .cloned()
    }

    /// Actively tracked records of `task_type`, newest first.
    pub fn list_by_type(&self, task_type: &TaskType) -> TypeSnapshot {
        self.inner.read().snapshot_of(task_type)
    }

    /// Receiver that sees every accepted change to `task_id`.
    pub fn watch_task(
        &self,
        task_id: &TaskId,
    ) -> watch::Receiver<Option<Arc<TaskRecord>>> {
        let mut inner = self.inner.write();
        if let Some(sender) = inner.task_watchers.get(task_id) {
            return sender.subscribe();
        }

        let current = inner
            .active
            .get(task_id)
            .or_else(|| inner.retired.get(task_id))
            .cloned();
        let (sender, receiver) = watch::channel(current);
        inner.task_watchers.insert(task_id.clone(), sender);
        receiver
    }

    /// Receiver that sees a fresh snapshot whenever a record of `task_type`
    /// changes.
    pub fn watch_type(
        &self,
        task_type: &TaskType,
    ) -> watch::Receiver<TypeSnapshot> {
        let mut inner = self.inner.write();
        if let Some(sender) = inner.type_watchers.get(task_type) {
            return sender.subscribe();
        }

        let (sender, receiver) = watch::channel(inner.snapshot_of(task_type));
        inner.type_watchers.insert(task_type.clone(), sender);
        receiver
    }

    /// Register an observer and replay the current state of every type to it.
    pub fn add_observer(&self, observer: Arc<dyn RegistryObserver>) {
        let mut inner = self.inner.write();
        for task_type in inner.known_types() {
            let snapshot = inner.snapshot_of(&task_type);
            observer.on_type_changed(&task_type, &snapshot);
        }
        inner.observers.push(observer);
    }

    /// Move terminal records that `keep` does not claim out of active
    /// tracking into the bounded retired cache. Returns how many moved.
    pub fn retire_terminal<F>(&self, keep: F) -> usize
    where
        F: Fn(&TaskRecord) -> bool,
    {
        let mut inner = self.inner.write();
        let retiring: Vec<TaskId> = inner
            .active
            .values()
            .filter(|record| record.is_terminal() && !keep(record))
            .map(|record| record.id.clone())
            .collect();

        let mut touched_types = HashSet::new();
        for task_id in &retiring {
            if let Some(record) = inner.active.remove(task_id) {
                touched_types.insert(record.task_type.clone());
                inner.stash_retired(record);
            }
        }
        for task_type in &touched_types {
            inner.publish_type(task_type);
        }
        inner
            .task_watchers
            .retain(|_, sender| sender.receiver_count() > 0);

        if !retiring.is_empty() {
            debug!(
                "[TaskRegistry] Retired {} terminal task(s)",
                retiring.len()
            );
        }
        retiring.len()
    }

    /// Number of actively tracked records.
    pub fn len(&self) -> usize {
        self.inner.read().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn resolve(
    existing: &TaskRecord,
    update: &TaskUpdate,
) -> Result<TaskRecord, MergeOutcome> {
    if let (Some(incoming), Some(stored)) =
        (update.updated_at, existing.updated_at)
        && incoming < stored
    {
        return Err(MergeOutcome::Stale);
    }

    if let Some(next) = update.status {
        if existing.is_terminal() && next != existing.status {
            return Err(MergeOutcome::Terminal);
        }
        if !existing.status.can_advance_to(next) {
            return Err(MergeOutcome::Regressed);
        }
    }

    let mut candidate = existing.clone();
    candidate.absorb(update);

    // A terminal record is frozen; only a replay that leaves every field
    // but `updated_at` intact is tolerated, and it is still a no-op.
    if existing.is_terminal() {
        candidate.updated_at = existing.updated_at;
        return Err(if candidate == *existing {
            MergeOutcome::Unchanged
        } else {
            MergeOutcome::Terminal
        });
    }

    if candidate == *existing {
        return Err(MergeOutcome::Unchanged);
    }
    Ok(candidate)
}

fn log_rejection(
    update: &TaskUpdate,
    source: UpdateSource,
    outcome: MergeOutcome,
) {
    if outcome != MergeOutcome::Unchanged {
        debug!(
            "[TaskRegistry] Dropped {} update for task {}: {:?}",
            source, update.id, outcome
        );
    }
}

impl RegistryInner {
    fn snapshot_of(&self, task_type: &TaskType) -> TypeSnapshot {
        let mut records: Vec<Arc<TaskRecord>> = self
            .active
            .values()
            .filter(|record| &record.task_type == task_type)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Arc::new(records)
    }

    fn known_types(&self) -> Vec<TaskType> {
        let types: HashSet<&TaskType> = self
            .active
            .values()
            .map(|record| &record.task_type)
            .filter(|task_type| !task_type.is_unknown())
            .collect();
        types.into_iter().cloned().collect()
    }

    fn publish_record(&mut self, record: &Arc<TaskRecord>) {
        let Some(sender) = self.task_watchers.get(&record.id) else {
            return;
        };
        if sender.receiver_count() == 0 {
            self.task_watchers.remove(&record.id);
            return;
        }
        sender.send_replace(Some(record.clone()));
    }

    fn publish_type(&mut self, task_type: &TaskType) {
        if task_type.is_unknown() {
            return;
        }

        let snapshot = self.snapshot_of(task_type);
        for observer in &self.observers {
            observer.on_type_changed(task_type, &snapshot);
        }

        let Some(sender) = self.type_watchers.get(task_type) else {
            return;
        };
        if sender.receiver_count() == 0 {
            self.type_watchers.remove(task_type);
            return;
        }
        sender.send_replace(snapshot);
    }

    fn stash_retired(&mut self, record: Arc<TaskRecord>) {
        if self.retired_capacity == 0 {
            return;
        }

        let task_id = record.id.clone();
        if self.retired.insert(task_id.clone(), record).is_none() {
            self.retired_order.push_back(task_id);
        }
        while self.retired_order.len() > self.retired_capacity {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }
}
