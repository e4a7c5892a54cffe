//! One synchronization layer per application session.

use std::fmt;
use std::sync::Arc;

use log::info;
use taskwatch_model::{
    BatchDownloadSummary, EntityId, TaskAccepted, TaskId, TaskRecord, TaskType,
    TaskUpdate, UpdateSource,
};
use tokio::sync::watch;

use crate::api::{ApiClient, ApiService};
use crate::busy::{BusySet, EntityBusyIndex};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::poller;
use crate::registry::{TaskRegistry, TypeSnapshot};
use crate::stream::{
    EventTransport, SseTransport, StreamHealth, TaskStreamClient,
};
use crate::subscriptions::{SubscriptionHandle, SubscriptionManager};
use crate::target::WatchTarget;

/// Outcome of submitting a task-starting action.
#[derive(Debug)]
pub enum Submission {
    /// The backend started a task; the handle follows it.
    Tracking(SubscriptionHandle),
    /// The backend finished the work synchronously; nothing to track.
    Completed { message: Option<String> },
}

impl Submission {
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Submission::Tracking(handle) => match handle.target() {
                WatchTarget::Task(task_id) => Some(task_id),
                WatchTarget::Type(_) => None,
            },
            Submission::Completed { .. } => None,
        }
    }
}

/// Busy set of one task type, kept fresh by a type subscription for as long
/// as the watch lives.
#[derive(Debug)]
pub struct BusyWatch {
    receiver: watch::Receiver<BusySet>,
    _subscription: SubscriptionHandle,
}

impl BusyWatch {
    pub fn current(&self) -> BusySet {
        self.receiver.borrow().clone()
    }

    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.receiver.borrow().contains(entity_id)
    }

    /// Wait until the set changes. Returns `false` once the index is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

/// Facade owning the registry, the shared stream connection, the busy
/// index and all subscriptions.
pub struct TaskSyncSession {
    api: Arc<dyn ApiService>,
    registry: Arc<TaskRegistry>,
    busy: Arc<EntityBusyIndex>,
    stream: TaskStreamClient,
    subscriptions: SubscriptionManager,
}

impl fmt::Debug for TaskSyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSyncSession")
            .field("api", &self.api)
            .field("registry", &self.registry)
            .field("stream", &self.stream)
            .finish()
    }
}

impl TaskSyncSession {
    /// Build a session talking HTTP + SSE to `config.server_url`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = ApiClient::new(config)?;
        let transport = SseTransport::new(
            client.stream_client().clone(),
            client.events_url(),
        );
        Ok(Self::from_parts(config, Arc::new(client), Arc::new(transport)))
    }

    /// Build a session over injected seams.
    pub fn from_parts(
        config: &SyncConfig,
        api: Arc<dyn ApiService>,
        transport: Arc<dyn EventTransport>,
    ) -> Self {
        let registry = Arc::new(TaskRegistry::new(&config.registry));
        let busy = Arc::new(EntityBusyIndex::new());
        registry.add_observer(busy.clone());

        let stream = TaskStreamClient::new(
            transport,
            registry.clone(),
            config.stream.clone(),
        );
        let subscriptions = SubscriptionManager::new(
            api.clone(),
            registry.clone(),
            config.poll.clone(),
            stream.watch_health(),
        );

        Self {
            api,
            registry,
            busy,
            stream,
            subscriptions,
        }
    }

    /// Open the shared stream connection. Idempotent; also re-arms
    /// polling after a `shutdown`.
    pub fn open(&self) {
        self.subscriptions.resume();
        self.stream.open();
    }

    /// Close the stream and stop every poller. Server-side tasks are not
    /// affected.
    pub fn shutdown(&self) {
        info!("Shutting down task sync session");
        self.stream.close();
        self.subscriptions.stop_all();
    }

    pub fn health(&self) -> StreamHealth {
        self.stream.health()
    }

    pub fn watch_health(&self) -> watch::Receiver<StreamHealth> {
        self.stream.watch_health()
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn subscribe(&self, target: WatchTarget) -> SubscriptionHandle {
        self.subscriptions.subscribe(target)
    }

    pub fn subscribe_task(
        &self,
        task_id: impl Into<TaskId>,
    ) -> SubscriptionHandle {
        self.subscribe(WatchTarget::Task(task_id.into()))
    }

    pub fn subscribe_type(
        &self,
        task_type: impl Into<TaskType>,
    ) -> SubscriptionHandle {
        self.subscribe(WatchTarget::Type(task_type.into()))
    }

    pub fn get(&self, task_id: &TaskId) -> Option<Arc<TaskRecord>> {
        self.registry.get(task_id)
    }

    /// Fetch one task from the backend now and return the merged record.
    /// Unlike subscriptions, fetch errors reach the caller.
    pub async fn refresh(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<Arc<TaskRecord>>> {
        let target = WatchTarget::Task(task_id.clone());
        poller::pull(
            self.api.as_ref(),
            &self.registry,
            &target,
            UpdateSource::Poll,
        )
        .await?;
        Ok(self.registry.get(task_id))
    }

    pub fn list_by_type(&self, task_type: &TaskType) -> TypeSnapshot {
        self.registry.list_by_type(task_type)
    }

    /// Reactive busy set for `task_type`. Holds a type subscription so the
    /// set stays fresh while the stream is degraded.
    pub fn busy(&self, task_type: impl Into<TaskType>) -> BusyWatch {
        let task_type = task_type.into();
        let receiver = self.busy.watch(&task_type);
        BusyWatch {
            receiver,
            _subscription: self.subscribe(WatchTarget::Type(task_type)),
        }
    }

    pub fn is_busy(&self, task_type: &TaskType, entity_id: &EntityId) -> bool {
        self.busy.is_busy(task_type, entity_id)
    }

    pub async fn start_sync(&self) -> Result<Submission> {
        let accepted = self.api.start_sync().await?;
        Ok(self.track(accepted, TaskType::sync(), None))
    }

    pub async fn start_recent_updates_sync(&self) -> Result<Submission> {
        let accepted = self.api.start_recent_updates_sync().await?;
        Ok(self.track(accepted, TaskType::sync_recent_updates(), None))
    }

    /// Start a single-entity download. The entity is marked busy as soon as
    /// the backend hands back a task id; a synchronous completion never
    /// marks it.
    pub async fn download(&self, entity_id: &EntityId) -> Result<Submission> {
        let accepted = self.api.start_download(entity_id).await?;
        Ok(self.track(accepted, TaskType::download(), Some(entity_id)))
    }

    /// Queue downloads for several entities. They count as busy while the
    /// request is in flight; afterwards the backend's per-entity tasks take
    /// over, as they are pushed and backfilled.
    pub async fn download_batch(
        &self,
        entity_ids: &[EntityId],
    ) -> Result<BatchDownloadSummary> {
        let _hold = self.busy.hold(&TaskType::download(), entity_ids);
        self.api.download_batch(entity_ids).await
    }

    fn track(
        &self,
        accepted: TaskAccepted,
        task_type: TaskType,
        entity_id: Option<&EntityId>,
    ) -> Submission {
        let Some(task_id) = accepted.tracked_task().cloned() else {
            return Submission::Completed {
                message: accepted.message,
            };
        };

        let mut seed = TaskUpdate::new(task_id.clone()).with_type(task_type);
        seed.entity_id = entity_id.cloned();
        self.registry.merge(seed, UpdateSource::Local);

        Submission::Tracking(self.subscribe_task(task_id))
    }
}
