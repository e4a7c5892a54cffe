#![allow(dead_code)]

pub mod fakes;

use std::time::Duration;

use taskwatch_core::{PollConfig, StreamConfig, SyncConfig};

pub const TASK_INTERVAL: Duration = Duration::from_secs(10);
pub const TYPE_INTERVAL: Duration = Duration::from_secs(30);

pub fn test_config() -> SyncConfig {
    SyncConfig {
        poll: PollConfig {
            task_interval_ms: TASK_INTERVAL.as_millis() as u64,
            type_interval_ms: TYPE_INTERVAL.as_millis() as u64,
        },
        stream: StreamConfig {
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 8_000,
            max_reconnects: None,
        },
        ..SyncConfig::default()
    }
}

/// Let spawned tasks run until they are all parked. Only meaningful with a
/// paused clock, where the 1ms sleep fires after everything else settles.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Advance the paused clock by `duration` plus a little slack.
pub async fn pass(duration: Duration) {
    tokio::time::sleep(duration + Duration::from_millis(5)).await;
}
