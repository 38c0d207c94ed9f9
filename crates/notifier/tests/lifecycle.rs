//! Start and terminate sequencing of the bridge.

mod common;

use std::sync::Arc;
use std::time::Duration;

use herald_common::error::BridgeError;
use herald_common::session::ChatSession;
use herald_common::types::SessionState;
use herald_notifier::NotifyBridge;

use common::{FakeQueue, FakeSession, RecordingMonitor, event_log, events, item};

const QUEUE: &str = "irc-notifications";

fn bridge(
    queue: &Arc<FakeQueue>,
    session: &Arc<FakeSession>,
    monitor: &Arc<RecordingMonitor>,
) -> NotifyBridge {
    NotifyBridge::new(session.clone(), queue.clone(), monitor.clone(), QUEUE)
}

#[tokio::test(start_paused = true)]
async fn test_start_connects_provisions_and_consumes() {
    let log = event_log();
    let queue = Arc::new(FakeQueue::new(log.clone()));
    let session = Arc::new(FakeSession::new(log.clone()));
    let monitor = Arc::new(RecordingMonitor::default());
    queue.push_batch(vec![item("a", r#"{"user":"bob","message":"hi"}"#, 1)]);

    let mut bridge = bridge(&queue, &session, &monitor);
    bridge.start().await.unwrap();
    assert_eq!(bridge.session().state(), SessionState::Connected);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stats = bridge.stats();
    bridge.terminate().await.unwrap();

    assert_eq!(
        events(&log),
        vec![
            "connect".to_string(),
            format!("create_queue:{QUEUE}"),
            "receive:1".to_string(),
            "send:bob:hi".to_string(),
            "delete:rh-a".to_string(),
            "disconnect".to_string(),
        ]
    );
    assert_eq!(stats.snapshot().delivered, 1);
    assert_eq!(monitor.error_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_terminate_drains_current_batch_before_disconnecting() {
    let log = event_log();
    let queue = Arc::new(FakeQueue::new(log.clone()));
    let session = Arc::new(FakeSession::new(log.clone()));
    let monitor = Arc::new(RecordingMonitor::default());
    *session.send_delay.lock().unwrap() = Duration::from_secs(1);
    queue.push_batch(vec![
        item("a", r#"{"user":"u1","message":"one"}"#, 1),
        item("b", r#"{"user":"u2","message":"two"}"#, 1),
        item("c", r#"{"user":"u3","message":"three"}"#, 1),
    ]);
    queue.push_batch(vec![item("d", r#"{"user":"u4","message":"four"}"#, 1)]);

    let mut bridge = bridge(&queue, &session, &monitor);
    bridge.start().await.unwrap();

    // Stop while the first send of the first batch is in progress
    tokio::time::sleep(Duration::from_millis(500)).await;
    bridge.terminate().await.unwrap();

    assert_eq!(
        events(&log),
        vec![
            "connect".to_string(),
            format!("create_queue:{QUEUE}"),
            "receive:3".to_string(),
            "send:u1:one".to_string(),
            "delete:rh-a".to_string(),
            "send:u2:two".to_string(),
            "delete:rh-b".to_string(),
            "send:u3:three".to_string(),
            "delete:rh-c".to_string(),
            "disconnect".to_string(),
        ]
    );
    // The second batch was never received
    assert_eq!(queue.deleted().len(), 3);
}

#[tokio::test]
async fn test_start_fails_when_connect_fails() {
    let log = event_log();
    let queue = Arc::new(FakeQueue::new(log.clone()));
    let session = Arc::new(FakeSession::new(log.clone()));
    let monitor = Arc::new(RecordingMonitor::default());
    *session.fail_connect.lock().unwrap() = true;

    let mut bridge = bridge(&queue, &session, &monitor);
    let err = bridge.start().await.unwrap_err();

    assert!(matches!(err, BridgeError::Registration(_)));
    assert_eq!(events(&log), vec!["connect".to_string()]);
}

#[tokio::test]
async fn test_start_disconnects_when_queue_provisioning_fails() {
    let log = event_log();
    let queue = Arc::new(FakeQueue::new(log.clone()));
    let session = Arc::new(FakeSession::new(log.clone()));
    let monitor = Arc::new(RecordingMonitor::default());
    *queue.fail_create.lock().unwrap() = true;

    let mut bridge = bridge(&queue, &session, &monitor);
    let err = bridge.start().await.unwrap_err();

    assert!(matches!(err, BridgeError::Queue(_)));
    assert_eq!(
        events(&log),
        vec![
            "connect".to_string(),
            format!("create_queue:{QUEUE}"),
            "disconnect".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let log = event_log();
    let queue = Arc::new(FakeQueue::new(log.clone()));
    let session = Arc::new(FakeSession::new(log.clone()));
    let monitor = Arc::new(RecordingMonitor::default());

    let mut bridge = bridge(&queue, &session, &monitor);
    bridge.start().await.unwrap();
    let err = bridge.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::Internal(_)));

    bridge.terminate().await.unwrap();
}

#[tokio::test]
async fn test_fatal_queue_error_finishes_bridge() {
    let log = event_log();
    let queue = Arc::new(FakeQueue::new(log.clone()));
    let session = Arc::new(FakeSession::new(log.clone()));
    let monitor = Arc::new(RecordingMonitor::default());
    *queue.fail_receive.lock().unwrap() = true;

    let mut bridge = bridge(&queue, &session, &monitor);
    bridge.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), bridge.finished())
        .await
        .expect("consumer should stop on a receive error");
    assert_eq!(monitor.error_count(), 1);

    let err = bridge.terminate().await.unwrap_err();
    assert!(matches!(err, BridgeError::Queue(_)));
    assert_eq!(events(&log).last().map(String::as_str), Some("disconnect"));
    assert_eq!(session.state(), SessionState::Disconnected);
}
