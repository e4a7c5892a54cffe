//! Pull-based fallback while the event stream is degraded.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use taskwatch_model::{TaskId, TaskType, UpdateSource};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::ApiService;
use crate::error::Result;
use crate::registry::TaskRegistry;
use crate::target::WatchTarget;

/// Periodic puller for one [`WatchTarget`].
///
/// The first tick fires one full interval after `start()`. Failed pulls are
/// logged and swallowed; the next tick simply tries again.
pub struct FallbackPoller {
    target: WatchTarget,
    interval: Duration,
    api: Arc<dyn ApiService>,
    registry: Arc<TaskRegistry>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for FallbackPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPoller")
            .field("target", &self.target)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl FallbackPoller {
    pub fn new(
        target: WatchTarget,
        interval: Duration,
        api: Arc<dyn ApiService>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            target,
            interval,
            api,
            registry,
            task: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start ticking. Repeated calls while running have no effect.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        debug!(
            "[FallbackPoller] Polling {} every {:?}",
            self.target, self.interval
        );
        let target = self.target.clone();
        let interval = self.interval;
        let api = self.api.clone();
        let registry = self.registry.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) =
                    pull(api.as_ref(), &registry, &target, UpdateSource::Poll)
                        .await
                {
                    debug!(
                        "[FallbackPoller] Poll for {} failed: {}",
                        target, err
                    );
                }
            }
        }));
    }

    /// Cancel the timer. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            debug!("[FallbackPoller] Stopped polling {}", self.target);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Issue one pull for `target` and merge the result. Returns how many
/// merges were applied.
///
/// A type pull only sees running tasks, so afterwards every non-terminal
/// record of that type missing from the response gets a point fetch; that
/// is how tasks finishing during an outage leave the busy sets.
pub async fn pull(
    api: &dyn ApiService,
    registry: &TaskRegistry,
    target: &WatchTarget,
    source: UpdateSource,
) -> Result<usize> {
    match target {
        WatchTarget::Task(task_id) => {
            pull_task(api, registry, task_id, source).await
        }
        WatchTarget::Type(task_type) => {
            pull_type(api, registry, task_type, source).await
        }
    }
}

async fn pull_task(
    api: &dyn ApiService,
    registry: &TaskRegistry,
    task_id: &TaskId,
    source: UpdateSource,
) -> Result<usize> {
    let Some(update) = api.fetch_task(task_id).await? else {
        debug!("[FallbackPoller] Task {} not known to backend", task_id);
        return Ok(0);
    };
    Ok(usize::from(registry.merge(update, source).is_applied()))
}

async fn pull_type(
    api: &dyn ApiService,
    registry: &TaskRegistry,
    task_type: &TaskType,
    source: UpdateSource,
) -> Result<usize> {
    let running = api.fetch_running_tasks(Some(task_type.clone())).await?;
    let listed: HashSet<TaskId> =
        running.iter().map(|update| update.id.clone()).collect();

    let mut applied = 0;
    for mut update in running {
        if update.task_type.is_none() {
            update.task_type = Some(task_type.clone());
        }
        if registry.merge(update, source).is_applied() {
            applied += 1;
        }
    }

    let vanished: Vec<TaskId> = registry
        .list_by_type(task_type)
        .iter()
        .filter(|record| !record.is_terminal() && !listed.contains(&record.id))
        .map(|record| record.id.clone())
        .collect();
    for task_id in vanished {
        applied += pull_task(api, registry, &task_id, source).await?;
    }

    Ok(applied)
}
