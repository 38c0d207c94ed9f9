//! Lifecycle of the bridge: startup and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use herald_common::error::{BridgeError, Result};
use herald_common::monitor::Monitor;
use herald_common::queue::QueueService;
use herald_common::session::ChatSession;
use herald_common::types::ReceiveRequest;

use crate::consumer::QueueConsumer;
use crate::dispatcher::{Dispatcher, JOIN_TIMEOUT};
use crate::stats::DeliveryStats;

/// Owns the chat session and the background consumer task.
///
/// ```text
/// start():     connect session → create/resolve queue → spawn consumer
/// terminate(): raise stop → await consumer (drains batch) → disconnect
/// ```
pub struct NotifyBridge {
    session: Arc<dyn ChatSession>,
    queue: Arc<dyn QueueService>,
    monitor: Arc<dyn Monitor>,
    queue_name: String,
    stats: Arc<DeliveryStats>,
    join_timeout: Duration,
    receive_request: ReceiveRequest,
    /// Raised by `terminate`
    stop: CancellationToken,
    /// Raised when the consumer task exits, for whatever reason
    finished: CancellationToken,
    worker: Option<JoinHandle<Result<()>>>,
}

impl NotifyBridge {
    pub fn new(
        session: Arc<dyn ChatSession>,
        queue: Arc<dyn QueueService>,
        monitor: Arc<dyn Monitor>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            session,
            queue,
            monitor,
            queue_name: queue_name.into(),
            stats: Arc::new(DeliveryStats::new()),
            join_timeout: JOIN_TIMEOUT,
            receive_request: QueueConsumer::default_request(),
            stop: CancellationToken::new(),
            finished: CancellationToken::new(),
            worker: None,
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_receive_request(mut self, request: ReceiveRequest) -> Self {
        self.receive_request = request;
        self
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        self.stats.clone()
    }

    pub fn session(&self) -> Arc<dyn ChatSession> {
        self.session.clone()
    }

    /// Connect, provision the queue and launch the consumer in the background.
    ///
    /// Returns as soon as the consumer is running. Connection and queue
    /// provisioning errors are returned here; nothing is left running on
    /// error.
    pub async fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(BridgeError::Internal("bridge already started".to_string()));
        }

        self.session.connect().await?;

        let queue_ref = match self.queue.create_queue(&self.queue_name).await {
            Ok(queue_ref) => queue_ref,
            Err(e) => {
                tracing::error!(queue = %self.queue_name, error = %e, "Failed to provision queue");
                if let Err(disconnect) = self.session.disconnect().await {
                    tracing::warn!(error = %disconnect, "Failed to disconnect after startup error");
                }
                return Err(e);
            }
        };
        tracing::info!(queue = %queue_ref, "Connecting to queue");

        let dispatcher = Dispatcher::new(self.session.clone()).with_join_timeout(self.join_timeout);
        let consumer = QueueConsumer::new(
            self.queue.clone(),
            queue_ref.clone(),
            dispatcher,
            self.monitor.clone(),
            self.stats.clone(),
        )
        .with_request(self.receive_request);

        let stop = self.stop.clone();
        let finished = self.finished.clone();
        let monitor = self.monitor.clone();

        self.worker = Some(tokio::spawn(async move {
            let _finished = finished.drop_guard();
            let result = consumer.run(stop).await;
            if let Err(e) = &result {
                tracing::error!(queue = %queue_ref, error = %e, "Queue consumer stopped with error");
                monitor.report_error(e, json!({ "queue": queue_ref.name }));
            }
            result
        }));

        tracing::info!("Notification bridge started");
        Ok(())
    }

    /// Resolves once the consumer task has exited, either after `terminate`
    /// or because of a fatal queue error.
    pub async fn finished(&self) {
        self.finished.cancelled().await;
    }

    /// Stop polling, let the current batch finish, then disconnect.
    ///
    /// A fatal consumer error is returned after the session has been
    /// disconnected.
    pub async fn terminate(mut self) -> Result<()> {
        tracing::info!("Stopping notification bridge");
        self.stop.cancel();

        let consumer_result = match self.worker.take() {
            Some(worker) => worker
                .await
                .unwrap_or_else(|e| Err(BridgeError::Internal(format!("consumer task failed: {e}")))),
            None => Ok(()),
        };

        let disconnect_result = self.session.disconnect().await;
        tracing::info!("Notification bridge stopped");

        consumer_result.and(disconnect_result)
    }
}
