//! Runtime settings for the synchronization layer.
//!
//! Loading from files and the environment lives in `taskwatch-config`; this
//! module only defines the shape and defaults so the core can be built
//! without it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level settings. Every field has a default so partial files work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the task backend, without the `/api` prefix.
    pub server_url: String,
    /// Per-request timeout (ms) for action and poll calls. The event stream
    /// is exempt since it stays open indefinitely.
    pub request_timeout_ms: u64,
    pub poll: PollConfig,
    pub stream: StreamConfig,
    pub registry: RegistryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 30_000,
            poll: PollConfig::default(),
            stream: StreamConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Fallback polling cadence while the stream is degraded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    /// Interval (ms) for polling a single task by id.
    pub task_interval_ms: u64,
    /// Interval (ms) for polling the running list of one task type. Longer
    /// than the single-task interval to bound request volume.
    pub type_interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            task_interval_ms: 10_000,
            type_interval_ms: 30_000,
        }
    }
}

impl PollConfig {
    pub fn task_interval(&self) -> Duration {
        Duration::from_millis(self.task_interval_ms)
    }

    pub fn type_interval(&self) -> Duration {
        Duration::from_millis(self.type_interval_ms)
    }
}

/// Reconnect policy for the shared event stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    /// Consecutive failed connection attempts before giving up. `None`
    /// reconnects forever.
    pub max_reconnects: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
            max_reconnects: None,
        }
    }
}

impl StreamConfig {
    /// Delay before reconnect attempt `attempt` (1-based):
    /// `min(max, base * 2^(attempt - 1))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .reconnect_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.reconnect_max_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Terminal records kept after they leave active tracking, so late point
    /// lookups still answer.
    pub retired_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retired_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let stream = StreamConfig::default();
        assert_eq!(stream.backoff(1), Duration::from_secs(1));
        assert_eq!(stream.backoff(2), Duration::from_secs(2));
        assert_eq!(stream.backoff(5), Duration::from_secs(16));
        assert_eq!(stream.backoff(6), Duration::from_secs(30));
        assert_eq!(stream.backoff(200), Duration::from_secs(30));
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"poll": {"task_interval_ms": 2500}}"#)
                .expect("partial config");
        assert_eq!(config.poll.task_interval(), Duration::from_millis(2500));
        assert_eq!(config.poll.type_interval(), Duration::from_secs(30));
        assert_eq!(config.server_url, "http://localhost:8000");
    }
}
