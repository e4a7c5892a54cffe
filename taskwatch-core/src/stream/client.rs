use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use taskwatch_model::UpdateSource;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::decode::{StreamEvent, decode};
use super::transport::{EventTransport, TransportEvent};
use crate::config::StreamConfig;
use crate::registry::TaskRegistry;

/// Two-state health of the shared stream connection. Pollers run while it
/// is `Degraded`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StreamHealth {
    Healthy,
    /// Initial state until the backend confirms with `connected`.
    #[default]
    Degraded,
}

impl fmt::Display for StreamHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamHealth::Healthy => f.write_str("healthy"),
            StreamHealth::Degraded => f.write_str("degraded"),
        }
    }
}

/// Owns the single event-stream connection for a session.
///
/// Decoded task events are merged into the registry in arrival order.
/// Transport errors and closes flip health to `Degraded` and schedule a
/// reconnect with exponential backoff; the next `connected` event flips it
/// back to `Healthy`.
pub struct TaskStreamClient {
    transport: Arc<dyn EventTransport>,
    registry: Arc<TaskRegistry>,
    policy: StreamConfig,
    health: Arc<watch::Sender<StreamHealth>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for TaskStreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStreamClient")
            .field("transport", &self.transport)
            .field("health", &*self.health.borrow())
            .field("open", &self.is_open())
            .finish()
    }
}

impl TaskStreamClient {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        registry: Arc<TaskRegistry>,
        policy: StreamConfig,
    ) -> Self {
        let (health, _) = watch::channel(StreamHealth::Degraded);
        Self {
            transport,
            registry,
            policy,
            health: Arc::new(health),
            task: Mutex::new(None),
        }
    }

    /// Start the connection loop. A no-op while it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Event stream already open");
            return;
        }

        let pump = StreamPump {
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            policy: self.policy.clone(),
            health: self.health.clone(),
        };
        *task = Some(tokio::spawn(pump.run()));
    }

    /// Stop the connection loop and report the stream as degraded.
    pub fn close(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("Event stream closed");
        }
        set_health(&self.health, StreamHealth::Degraded);
    }

    pub fn is_open(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn health(&self) -> StreamHealth {
        *self.health.borrow()
    }

    pub fn watch_health(&self) -> watch::Receiver<StreamHealth> {
        self.health.subscribe()
    }
}

impl Drop for TaskStreamClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

struct StreamPump {
    transport: Arc<dyn EventTransport>,
    registry: Arc<TaskRegistry>,
    policy: StreamConfig,
    health: Arc<watch::Sender<StreamHealth>>,
}

impl StreamPump {
    async fn run(self) {
        let mut failures: u32 = 0;

        loop {
            let mut events = self.transport.connect();
            while let Some(event) = events.next().await {
                match event {
                    TransportEvent::Open => debug!("Event stream opened"),
                    TransportEvent::Message { event, data } => {
                        if self.dispatch(&event, &data) {
                            failures = 0;
                        }
                    }
                    TransportEvent::Error(err) => {
                        warn!("Event stream error: {}", err);
                        break;
                    }
                    TransportEvent::Closed => {
                        warn!("Event stream closed by server");
                        break;
                    }
                }
            }
            drop(events);

            set_health(&self.health, StreamHealth::Degraded);
            failures = failures.saturating_add(1);
            if let Some(max) = self.policy.max_reconnects
                && failures > max
            {
                warn!(
                    "Giving up on event stream after {} failed attempt(s); \
                     relying on polling",
                    max
                );
                return;
            }

            let delay = self.policy.backoff(failures);
            debug!(
                "Reconnecting event stream in {:?} (attempt {})",
                delay, failures
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Returns `true` when the frame confirmed the connection.
    fn dispatch(&self, event: &str, data: &str) -> bool {
        match decode(event, data) {
            Ok(Some(StreamEvent::Connected)) => {
                set_health(&self.health, StreamHealth::Healthy);
                true
            }
            Ok(Some(
                StreamEvent::TaskCreated(update)
                | StreamEvent::TaskUpdated(update),
            )) => {
                self.registry.merge(update, UpdateSource::Stream);
                false
            }
            Ok(None) => false,
            Err(err) => {
                warn!("Discarding stream payload: {}", err);
                false
            }
        }
    }
}

fn set_health(health: &watch::Sender<StreamHealth>, next: StreamHealth) {
    let changed = health.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
    if changed {
        info!("Event stream is {}", next);
    }
}
