//! In-memory collaborators shared by the notifier tests.
//!
//! Every fake appends to one [`EventLog`] so tests can assert on the order
//! in which the queue and the session were touched.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use herald_common::error::{BridgeError, Result};
use herald_common::monitor::Monitor;
use herald_common::queue::QueueService;
use herald_common::session::{ChatSession, JoinAck};
use herald_common::types::{QueueItem, QueueRef, ReceiptHandle, ReceiveRequest, SessionState};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn item(id: &str, body: &str, receive_count: u32) -> QueueItem {
    QueueItem {
        message_id: id.to_string(),
        receipt_handle: ReceiptHandle(format!("rh-{id}")),
        body: body.to_string(),
        receive_count,
    }
}

// ============================================================
// Queue
// ============================================================

pub struct FakeQueue {
    log: EventLog,
    batches: Mutex<VecDeque<Vec<QueueItem>>>,
    pub fail_receive: Mutex<bool>,
    pub fail_delete: Mutex<bool>,
    pub fail_create: Mutex<bool>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeQueue {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            batches: Mutex::new(VecDeque::new()),
            fail_receive: Mutex::new(false),
            fail_delete: Mutex::new(false),
            fail_create: Mutex::new(false),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Queue up the items returned by the next receive.
    pub fn push_batch(&self, items: Vec<QueueItem>) {
        self.batches.lock().unwrap().push_back(items);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn queue_ref() -> QueueRef {
        QueueRef {
            name: "irc-notifications".to_string(),
        }
    }
}

#[async_trait]
impl QueueService for FakeQueue {
    async fn create_queue(&self, name: &str) -> Result<QueueRef> {
        self.log.lock().unwrap().push(format!("create_queue:{name}"));
        if *self.fail_create.lock().unwrap() {
            return Err(BridgeError::Queue("create refused".to_string()));
        }
        Ok(QueueRef {
            name: name.to_string(),
        })
    }

    async fn receive(&self, _queue: &QueueRef, request: &ReceiveRequest) -> Result<Vec<QueueItem>> {
        if *self.fail_receive.lock().unwrap() {
            self.log.lock().unwrap().push("receive:error".to_string());
            return Err(BridgeError::Queue("receive refused".to_string()));
        }
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(items) => {
                self.log
                    .lock()
                    .unwrap()
                    .push(format!("receive:{}", items.len()));
                Ok(items)
            }
            None => {
                // Behave like an empty long poll
                tokio::time::sleep(request.wait).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete(&self, _queue: &QueueRef, receipt: &ReceiptHandle) -> Result<()> {
        if *self.fail_delete.lock().unwrap() {
            return Err(BridgeError::Queue("delete refused".to_string()));
        }
        self.log.lock().unwrap().push(format!("delete:{receipt}"));
        self.deleted.lock().unwrap().push(receipt.0.clone());
        Ok(())
    }
}

// ============================================================
// Session
// ============================================================

pub struct FakeSession {
    log: EventLog,
    state: Mutex<SessionState>,
    /// Confirm joins immediately; otherwise joins never confirm
    pub confirm_joins: Mutex<bool>,
    pub fail_connect: Mutex<bool>,
    pub failing_targets: Mutex<HashSet<String>>,
    pub fail_joins: Mutex<bool>,
    /// Simulated time spent in each send
    pub send_delay: Mutex<Duration>,
    held_acks: Mutex<Vec<oneshot::Sender<()>>>,
}

impl FakeSession {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            state: Mutex::new(SessionState::Disconnected),
            confirm_joins: Mutex::new(true),
            fail_connect: Mutex::new(false),
            failing_targets: Mutex::new(HashSet::new()),
            fail_joins: Mutex::new(false),
            send_delay: Mutex::new(Duration::ZERO),
            held_acks: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_target(&self, target: &str) {
        self.failing_targets
            .lock()
            .unwrap()
            .insert(target.to_string());
    }
}

#[async_trait]
impl ChatSession for FakeSession {
    async fn connect(&self) -> Result<()> {
        self.log.lock().unwrap().push("connect".to_string());
        if *self.fail_connect.lock().unwrap() {
            return Err(BridgeError::Registration("Password incorrect".to_string()));
        }
        *self.state.lock().unwrap() = SessionState::Connected;
        Ok(())
    }

    async fn request_join(&self, channel: &str) -> Result<JoinAck> {
        self.log.lock().unwrap().push(format!("join:{channel}"));
        if *self.fail_joins.lock().unwrap() {
            return Err(BridgeError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        if *self.confirm_joins.lock().unwrap() {
            let _ = tx.send(());
        } else {
            self.held_acks.lock().unwrap().push(tx);
        }
        Ok(JoinAck::Pending(rx))
    }

    async fn send(&self, target: &str, message: &str) -> Result<()> {
        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("send:{target}:{message}"));
        if self.failing_targets.lock().unwrap().contains(target) {
            return Err(BridgeError::ConnectionClosed);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.log.lock().unwrap().push("disconnect".to_string());
        *self.state.lock().unwrap() = SessionState::Disconnected;
        Ok(())
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }
}

// ============================================================
// Monitor
// ============================================================

#[derive(Default)]
pub struct RecordingMonitor {
    pub errors: Mutex<Vec<(String, serde_json::Value)>>,
    pub notices: Mutex<Vec<String>>,
}

impl RecordingMonitor {
    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl Monitor for RecordingMonitor {
    fn report_error(&self, error: &(dyn std::error::Error + Send + Sync), context: serde_json::Value) {
        self.errors.lock().unwrap().push((error.to_string(), context));
    }

    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}
