//! Reference-counted interest in tasks.
//!
//! Identical targets share one seed pull and one [`FallbackPoller`]. The
//! first subscriber seeds the registry immediately, so even a task that is
//! already terminal becomes visible without waiting for a push. Pollers
//! follow stream health: they run while it is degraded and stop once it is
//! healthy again. While it is healthy, pushed tasks of a watched type that
//! arrive without entity references get one point fetch, so they show up in
//! the busy sets.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::Mutex;
use taskwatch_model::{TaskId, TaskRecord, TaskType, UpdateSource};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::ApiService;
use crate::backfill::{self, EntityBackfill};
use crate::config::PollConfig;
use crate::poller::{self, FallbackPoller};
use crate::registry::{TaskRegistry, TypeSnapshot};
use crate::stream::StreamHealth;
use crate::target::WatchTarget;

pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    api: Arc<dyn ApiService>,
    registry: Arc<TaskRegistry>,
    poll: PollConfig,
    health: watch::Receiver<StreamHealth>,
    state: Mutex<ManagerState>,
    health_task: JoinHandle<()>,
    backfill_task: JoinHandle<()>,
}

#[derive(Default)]
struct ManagerState {
    targets: HashMap<WatchTarget, TargetEntry>,
    /// Set by `stop_all`; pollers stay off until `resume`.
    suspended: bool,
}

struct TargetEntry {
    refs: usize,
    poller: FallbackPoller,
    seed: Option<JoinHandle<()>>,
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        let targets: Vec<String> = state
            .targets
            .iter()
            .map(|(target, entry)| format!("{} x{}", target, entry.refs))
            .collect();
        f.debug_struct("SubscriptionManager")
            .field("targets", &targets)
            .field("health", &*self.inner.health.borrow())
            .finish()
    }
}

impl SubscriptionManager {
    /// Must be called from within a Tokio runtime: a background task
    /// follows `health` to start and stop pollers.
    pub fn new(
        api: Arc<dyn ApiService>,
        registry: Arc<TaskRegistry>,
        poll: PollConfig,
        health: watch::Receiver<StreamHealth>,
    ) -> Self {
        let (backfill, queue) = EntityBackfill::new();
        registry.add_observer(Arc::new(backfill));

        let inner = Arc::new_cyclic(|weak: &Weak<ManagerInner>| {
            let health_task = spawn_health_watch(weak.clone(), health.clone());
            let backfill_task = spawn_backfill(weak.clone(), queue);
            ManagerInner {
                api,
                registry,
                poll,
                health,
                state: Mutex::new(ManagerState::default()),
                health_task,
                backfill_task,
            }
        });
        Self { inner }
    }

    /// Register interest in `target`.
    ///
    /// The first subscriber of a target triggers a seed pull and, if the
    /// stream is currently degraded, starts its poller. Later subscribers
    /// share that wiring.
    pub fn subscribe(&self, target: WatchTarget) -> SubscriptionHandle {
        let inner = &self.inner;
        let updates = match &target {
            WatchTarget::Task(task_id) => {
                Updates::Task(inner.registry.watch_task(task_id))
            }
            WatchTarget::Type(task_type) => {
                Updates::Type(inner.registry.watch_type(task_type))
            }
        };

        let mut state = inner.state.lock();
        // health is read under the same lock `apply_health` holds
        let degraded = *inner.health.borrow() == StreamHealth::Degraded;
        let suspended = state.suspended;

        let entry =
            state.targets.entry(target.clone()).or_insert_with(|| {
                TargetEntry {
                    refs: 0,
                    poller: FallbackPoller::new(
                        target.clone(),
                        inner.interval_for(&target),
                        inner.api.clone(),
                        inner.registry.clone(),
                    ),
                    seed: None,
                }
            });
        entry.refs += 1;
        if entry.refs == 1 {
            debug!("[Subscriptions] First subscriber for {}", target);
            if degraded && !suspended {
                entry.poller.start();
            }
            entry.seed = Some(inner.spawn_seed(target.clone()));
        }
        drop(state);

        SubscriptionHandle {
            target,
            updates,
            manager: Some(Arc::downgrade(inner)),
        }
    }

    /// Release a handle. Equivalent to dropping it.
    pub fn unsubscribe(&self, mut handle: SubscriptionHandle) {
        handle.release();
    }

    pub fn subscriber_count(&self, target: &WatchTarget) -> usize {
        self.inner
            .state
            .lock()
            .targets
            .get(target)
            .map_or(0, |entry| entry.refs)
    }

    pub fn is_polling(&self, target: &WatchTarget) -> bool {
        self.inner
            .state
            .lock()
            .targets
            .get(target)
            .is_some_and(|entry| entry.poller.is_running())
    }

    /// Stop every poller and pending seed. Handles stay valid but receive
    /// no polled updates until [`resume`](Self::resume).
    pub fn stop_all(&self) {
        let mut state = self.inner.state.lock();
        state.suspended = true;
        for entry in state.targets.values_mut() {
            entry.poller.stop();
            if let Some(seed) = entry.seed.take() {
                seed.abort();
            }
        }
    }

    /// Let pollers follow stream health again after `stop_all`.
    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        if !state.suspended {
            return;
        }
        state.suspended = false;
        drop(state);
        self.inner.apply_health();
    }
}

impl ManagerInner {
    fn interval_for(&self, target: &WatchTarget) -> std::time::Duration {
        match target {
            WatchTarget::Task(_) => self.poll.task_interval(),
            WatchTarget::Type(_) => self.poll.type_interval(),
        }
    }

    fn spawn_seed(&self, target: WatchTarget) -> JoinHandle<()> {
        let api = self.api.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Err(err) =
                poller::pull(api.as_ref(), &registry, &target, UpdateSource::Seed)
                    .await
            {
                warn!("[Subscriptions] Seeding {} failed: {}", target, err);
            }
        })
    }

    /// Start or stop every poller to match the current health.
    fn apply_health(&self) {
        let state = self.state.lock();
        if state.suspended {
            return;
        }
        let health = *self.health.borrow();
        for entry in state.targets.values() {
            match health {
                StreamHealth::Degraded => entry.poller.start(),
                StreamHealth::Healthy => entry.poller.stop(),
            }
        }
    }

    /// Whether a queued task should be fetched for its entity references:
    /// it still lacks them, the stream is healthy (degraded types are
    /// polled anyway) and somebody watches its type.
    fn wants_backfill(&self, task_id: &TaskId) -> bool {
        let Some(record) = self.registry.get(task_id) else {
            return false;
        };
        if !backfill::needs_backfill(&record) {
            return false;
        }
        let state = self.state.lock();
        !state.suspended
            && *self.health.borrow() == StreamHealth::Healthy
            && state
                .targets
                .contains_key(&WatchTarget::Type(record.task_type.clone()))
    }

    fn release(&self, target: &WatchTarget) {
        let (ids, types) = {
            let mut state = self.state.lock();
            let Some(entry) = state.targets.get_mut(target) else {
                return;
            };
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs > 0 {
                return;
            }

            if let Some(entry) = state.targets.remove(target) {
                entry.poller.stop();
                if let Some(seed) = entry.seed {
                    seed.abort();
                }
            }
            debug!("[Subscriptions] Last subscriber left {}", target);
            watched_by(state.targets.keys())
        };

        self.registry.retire_terminal(|record| {
            ids.contains(&record.id) || types.contains(&record.task_type)
        });
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.health_task.abort();
        self.backfill_task.abort();
    }
}

fn watched_by<'a>(
    targets: impl Iterator<Item = &'a WatchTarget>,
) -> (HashSet<TaskId>, HashSet<TaskType>) {
    let mut ids = HashSet::new();
    let mut types = HashSet::new();
    for target in targets {
        match target {
            WatchTarget::Task(task_id) => {
                ids.insert(task_id.clone());
            }
            WatchTarget::Type(task_type) => {
                types.insert(task_type.clone());
            }
        }
    }
    (ids, types)
}

fn spawn_health_watch(
    manager: Weak<ManagerInner>,
    mut health: watch::Receiver<StreamHealth>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while health.changed().await.is_ok() {
            if let Some(inner) = manager.upgrade() {
                inner.apply_health();
            }
        }
    })
}

fn spawn_backfill(
    manager: Weak<ManagerInner>,
    mut queue: mpsc::UnboundedReceiver<TaskId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(task_id) = queue.recv().await {
            let (api, registry) = {
                let Some(inner) = manager.upgrade() else {
                    break;
                };
                if !inner.wants_backfill(&task_id) {
                    continue;
                }
                (inner.api.clone(), inner.registry.clone())
            };

            debug!("[Subscriptions] Fetching entities of task {}", task_id);
            let target = WatchTarget::Task(task_id);
            if let Err(err) = poller::pull(
                api.as_ref(),
                &registry,
                &target,
                UpdateSource::Seed,
            )
            .await
            {
                debug!("[Subscriptions] Fetching {} failed: {}", target, err);
            }
        }
    })
}

#[derive(Debug)]
enum Updates {
    Task(watch::Receiver<Option<Arc<TaskRecord>>>),
    Type(watch::Receiver<TypeSnapshot>),
}

/// Live view of one subscription. Dropping it releases the subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    target: WatchTarget,
    updates: Updates,
    manager: Option<Weak<ManagerInner>>,
}

impl SubscriptionHandle {
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Current record of a task subscription. Always `None` for type
    /// subscriptions.
    pub fn record(&self) -> Option<Arc<TaskRecord>> {
        match &self.updates {
            Updates::Task(receiver) => receiver.borrow().clone(),
            Updates::Type(_) => None,
        }
    }

    /// Current records behind the subscription, newest first.
    pub fn tasks(&self) -> TypeSnapshot {
        match &self.updates {
            Updates::Task(receiver) => {
                Arc::new(receiver.borrow().iter().cloned().collect())
            }
            Updates::Type(receiver) => receiver.borrow().clone(),
        }
    }

    /// Wait for the next accepted change. Returns `false` once the registry
    /// is gone.
    pub async fn changed(&mut self) -> bool {
        match &mut self.updates {
            Updates::Task(receiver) => receiver.changed().await.is_ok(),
            Updates::Type(receiver) => receiver.changed().await.is_ok(),
        }
    }

    /// Follow a task subscription until its record turns terminal.
    ///
    /// Returns `None` for type subscriptions, or if updates stop before the
    /// task finishes.
    pub async fn wait_terminal(&mut self) -> Option<Arc<TaskRecord>> {
        if !matches!(self.target, WatchTarget::Task(_)) {
            return None;
        }
        loop {
            if let Some(record) = self.record()
                && record.is_terminal()
            {
                return Some(record);
            }
            if !self.changed().await {
                return None;
            }
        }
    }

    /// Release the subscription now. Later calls (and the eventual drop) do
    /// nothing.
    pub fn release(&mut self) {
        if let Some(manager) = self.manager.take()
            && let Some(inner) = manager.upgrade()
        {
            inner.release(&self.target);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}
