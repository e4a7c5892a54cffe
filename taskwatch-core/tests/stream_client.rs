mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskwatch_core::model::{TaskId, TaskStatus};
use taskwatch_core::{StreamConfig, StreamHealth, TaskRegistry, TaskStreamClient};

use support::fakes::FakeTransport;
use support::{pass, settle};

fn client_with(
    policy: StreamConfig,
) -> (Arc<FakeTransport>, Arc<TaskRegistry>, TaskStreamClient) {
    let transport = Arc::new(FakeTransport::new());
    let registry = Arc::new(TaskRegistry::default());
    let client =
        TaskStreamClient::new(transport.clone(), registry.clone(), policy);
    (transport, registry, client)
}

fn default_policy() -> StreamConfig {
    support::test_config().stream
}

#[tokio::test(start_paused = true)]
async fn stream_starts_degraded_until_connected() {
    let (transport, _registry, client) = client_with(default_policy());
    assert_eq!(client.health(), StreamHealth::Degraded);

    client.open();
    settle().await;
    assert_eq!(client.health(), StreamHealth::Degraded);

    transport.connected();
    settle().await;
    assert_eq!(client.health(), StreamHealth::Healthy);
}

#[tokio::test(start_paused = true)]
async fn open_twice_keeps_a_single_connection() {
    let (transport, _registry, client) = client_with(default_policy());
    client.open();
    client.open();
    settle().await;
    client.open();
    settle().await;

    assert_eq!(transport.connects(), 1);
    assert!(client.is_open());
}

#[tokio::test(start_paused = true)]
async fn events_are_merged_in_arrival_order_and_garbage_is_skipped() {
    let (transport, registry, client) = client_with(default_policy());
    client.open();
    settle().await;
    transport.connected();

    transport.task_created(
        json!({"task_id": "t1", "task_type": "download", "status": "pending"}),
        "2024-05-01T12:00:00",
    );
    transport.emit("task_updated", "{this is not json");
    transport.emit("task_updated", "keepalive");
    transport.task_updated(
        json!({
            "task_id": "t1",
            "task_type": "download",
            "status": "running",
            "progress": 40,
            "completed_items": 0,
            "total_items": 1,
            "message": "Downloading",
            "error_message": null,
        }),
        "2024-05-01T12:00:05",
    );
    settle().await;

    let record = registry.get(&TaskId::from("t1")).expect("record");
    assert_eq!(record.status, TaskStatus::Running);
    assert_eq!(record.progress, 40);
    assert_eq!(client.health(), StreamHealth::Healthy);
}

#[tokio::test(start_paused = true)]
async fn transport_error_degrades_and_reconnects_with_backoff() {
    let (transport, _registry, client) = client_with(default_policy());
    let mut health = client.watch_health();
    client.open();
    settle().await;
    transport.connected();
    settle().await;
    assert_eq!(*health.borrow_and_update(), StreamHealth::Healthy);

    transport.refuse_next(2);
    transport.drop_connection();
    settle().await;
    assert_eq!(*health.borrow_and_update(), StreamHealth::Degraded);
    assert_eq!(transport.connects(), 1);

    // attempt 1 after 1s (refused), attempt 2 after 2s more (refused),
    // attempt 3 after 4s more (accepted)
    pass(Duration::from_secs(1)).await;
    assert_eq!(transport.connects(), 2);
    pass(Duration::from_secs(2)).await;
    assert_eq!(transport.connects(), 3);
    pass(Duration::from_secs(3)).await;
    assert_eq!(transport.connects(), 3);
    pass(Duration::from_secs(1)).await;
    assert_eq!(transport.connects(), 4);
    assert!(transport.is_live());

    transport.connected();
    settle().await;
    assert_eq!(client.health(), StreamHealth::Healthy);

    // the counter was reset by `connected`, so the next drop waits 1s again
    transport.drop_connection();
    pass(Duration::from_secs(1)).await;
    assert_eq!(transport.connects(), 5);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_reconnects() {
    let policy = StreamConfig {
        max_reconnects: Some(2),
        ..default_policy()
    };
    let (transport, _registry, client) = client_with(policy);
    transport.refuse_next(10);
    client.open();

    pass(Duration::from_secs(60)).await;
    assert_eq!(transport.connects(), 3);
    assert!(!client.is_open());
    assert_eq!(client.health(), StreamHealth::Degraded);

    // a later open starts over
    client.open();
    settle().await;
    assert_eq!(transport.connects(), 4);
}

#[tokio::test(start_paused = true)]
async fn close_stops_the_loop() {
    let (transport, _registry, client) = client_with(default_policy());
    client.open();
    settle().await;
    transport.connected();
    settle().await;

    client.close();
    settle().await;
    assert!(!client.is_open());
    assert_eq!(client.health(), StreamHealth::Degraded);

    pass(Duration::from_secs(60)).await;
    assert_eq!(transport.connects(), 1);
}
