use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use reqwest::StatusCode;
use taskwatch_core::model::{
    BatchDownloadSummary, EntityId, TaskAccepted, TaskId, TaskType, TaskUpdate,
};
use taskwatch_core::{ApiService, EventTransport, Result, SyncError, TransportEvent};
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    FetchTask(TaskId),
    FetchRunning(Option<TaskType>),
    StartSync,
    StartRecentUpdatesSync,
    StartDownload(EntityId),
    DownloadBatch(Vec<EntityId>),
}

/// In-memory backend: canned task bodies, a running list, scripted action
/// responses, and a log of every call.
#[derive(Debug, Default)]
pub struct StubApi {
    inner: Mutex<StubState>,
}

#[derive(Debug, Default)]
struct StubState {
    tasks: HashMap<TaskId, TaskUpdate>,
    running: Vec<TaskUpdate>,
    accepted: TaskAccepted,
    summary: BatchDownloadSummary,
    offline: bool,
    batch_gate: Option<Arc<Notify>>,
    calls: Vec<ApiCall>,
}

impl StubApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `update` from the point endpoint.
    pub fn put_task(&self, update: TaskUpdate) {
        self.inner.lock().tasks.insert(update.id.clone(), update);
    }

    pub fn set_running(&self, running: Vec<TaskUpdate>) {
        self.inner.lock().running = running;
    }

    pub fn set_accepted(&self, accepted: TaskAccepted) {
        self.inner.lock().accepted = accepted;
    }

    pub fn set_summary(&self, summary: BatchDownloadSummary) {
        self.inner.lock().summary = summary;
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Make `download_batch` wait until the returned gate is notified.
    pub fn gate_batches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner.lock().batch_gate = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&ApiCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn fetch_task_calls(&self, task_id: &str) -> usize {
        let task_id = TaskId::from(task_id);
        self.count(|call| *call == ApiCall::FetchTask(task_id.clone()))
    }

    pub fn fetch_running_calls(&self) -> usize {
        self.count(|call| matches!(call, ApiCall::FetchRunning(_)))
    }

    fn record(&self, call: ApiCall) -> Result<()> {
        let mut state = self.inner.lock();
        state.calls.push(call);
        if state.offline {
            return Err(SyncError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "backend offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ApiService for StubApi {
    async fn fetch_task(&self, task_id: &TaskId) -> Result<Option<TaskUpdate>> {
        self.record(ApiCall::FetchTask(task_id.clone()))?;
        Ok(self.inner.lock().tasks.get(task_id).cloned())
    }

    async fn fetch_running_tasks(
        &self,
        task_type: Option<TaskType>,
    ) -> Result<Vec<TaskUpdate>> {
        self.record(ApiCall::FetchRunning(task_type.clone()))?;
        let state = self.inner.lock();
        Ok(state
            .running
            .iter()
            .filter(|update| {
                task_type.is_none() || update.task_type == task_type
            })
            .cloned()
            .collect())
    }

    async fn start_sync(&self) -> Result<TaskAccepted> {
        self.record(ApiCall::StartSync)?;
        Ok(self.inner.lock().accepted.clone())
    }

    async fn start_recent_updates_sync(&self) -> Result<TaskAccepted> {
        self.record(ApiCall::StartRecentUpdatesSync)?;
        Ok(self.inner.lock().accepted.clone())
    }

    async fn start_download(
        &self,
        entity_id: &EntityId,
    ) -> Result<TaskAccepted> {
        self.record(ApiCall::StartDownload(entity_id.clone()))?;
        Ok(self.inner.lock().accepted.clone())
    }

    async fn download_batch(
        &self,
        entity_ids: &[EntityId],
    ) -> Result<BatchDownloadSummary> {
        self.record(ApiCall::DownloadBatch(entity_ids.to_vec()))?;
        let gate = self.inner.lock().batch_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.inner.lock().summary.clone())
    }
}

/// Event transport driven by the test.
///
/// Every `connect()` either fails straight away (while refusals remain) or
/// opens a live channel the test writes frames into.
#[derive(Debug, Default)]
pub struct FakeTransport {
    connects: AtomicUsize,
    refusals: AtomicUsize,
    live: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connection attempts fail.
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.live
            .lock()
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Send a named frame on the live connection.
    pub fn emit(&self, event: &str, data: &str) {
        if let Some(sender) = self.live.lock().as_ref() {
            let _ = sender.send(TransportEvent::Message {
                event: event.to_string(),
                data: data.to_string(),
            });
        }
    }

    pub fn connected(&self) {
        self.emit("connected", r#"{"message": "Connected to task events"}"#);
    }

    /// Emit a `task_updated` envelope around `data`.
    pub fn task_updated(&self, data: serde_json::Value, timestamp: &str) {
        let envelope = serde_json::json!({
            "type": "task_updated",
            "data": data,
            "timestamp": timestamp,
        });
        self.emit("task_updated", &envelope.to_string());
    }

    pub fn task_created(&self, data: serde_json::Value, timestamp: &str) {
        let envelope = serde_json::json!({
            "type": "task_created",
            "data": data,
            "timestamp": timestamp,
        });
        self.emit("task_created", &envelope.to_string());
    }

    /// Fail the live connection the way a dropped socket would.
    pub fn drop_connection(&self) {
        if let Some(sender) = self.live.lock().take() {
            let _ = sender.send(TransportEvent::Error("connection reset".into()));
        }
    }
}

impl EventTransport for FakeTransport {
    fn connect(&self) -> BoxStream<'static, TransportEvent> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if refused {
            return stream::iter([
                TransportEvent::Error("connection refused".into()),
                TransportEvent::Closed,
            ])
            .boxed();
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(TransportEvent::Open);
        *self.live.lock() = Some(sender);
        UnboundedReceiverStream::new(receiver).boxed()
    }
}
