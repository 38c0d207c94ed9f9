//! Queue consumer loop.
//!
//! Polls the queue, hands each item to the [`Dispatcher`] one at a time and
//! decides per item whether it is deleted or left for redelivery:
//!
//! | dispatch result                  | action                      |
//! |----------------------------------|-----------------------------|
//! | sent                             | delete                      |
//! | skipped (invalid channel, etc.)  | delete                      |
//! | failed, receive count < 5        | leave (redelivered later)   |
//! | failed, receive count >= 5       | delete (budget exhausted)   |

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use herald_common::error::Result;
use herald_common::monitor::Monitor;
use herald_common::queue::QueueService;
use herald_common::types::{Notification, QueueItem, QueueRef, ReceiveRequest};

use crate::dispatcher::{Delivery, Dispatcher};
use crate::stats::DeliveryStats;

/// Receive count at which a failing item is dropped instead of retried.
pub const MAX_RETRIES: u32 = 5;

/// Items requested per poll.
pub const RECEIVE_BATCH_SIZE: u32 = 10;

/// Long-poll wait per receive.
pub const RECEIVE_WAIT: Duration = Duration::from_secs(20);

/// How long a received item stays hidden before it can be received again.
pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// What happened to one received item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Sent, then deleted
    Delivered,
    /// Skipped by validation, deleted
    Dropped,
    /// Failed, left on the queue for redelivery
    Retained,
    /// Failed with the retry budget exhausted, deleted
    Abandoned,
}

impl ItemOutcome {
    pub fn is_deleted(self) -> bool {
        !matches!(self, ItemOutcome::Retained)
    }
}

/// Long-running consumer of one queue.
pub struct QueueConsumer {
    queue: Arc<dyn QueueService>,
    queue_ref: QueueRef,
    dispatcher: Dispatcher,
    monitor: Arc<dyn Monitor>,
    stats: Arc<DeliveryStats>,
    request: ReceiveRequest,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn QueueService>,
        queue_ref: QueueRef,
        dispatcher: Dispatcher,
        monitor: Arc<dyn Monitor>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            queue,
            queue_ref,
            dispatcher,
            monitor,
            stats,
            request: Self::default_request(),
        }
    }

    /// The receive parameters used by every poll.
    pub fn default_request() -> ReceiveRequest {
        ReceiveRequest {
            max_messages: RECEIVE_BATCH_SIZE,
            wait: RECEIVE_WAIT,
            visibility_timeout: VISIBILITY_TIMEOUT,
        }
    }

    pub fn with_request(mut self, request: ReceiveRequest) -> Self {
        self.request = request;
        self
    }

    /// Poll and process batches until `stop` is cancelled.
    ///
    /// The stop signal is checked between batches; a batch that has been
    /// received is always processed to the end. A poll that is still waiting
    /// when stop is raised is abandoned (anything it claimed becomes visible
    /// again after the visibility timeout).
    ///
    /// Delivery failures never end the loop. Queue failures do.
    pub async fn run(&self, stop: CancellationToken) -> Result<()> {
        tracing::info!(queue = %self.queue_ref, "Queue consumer started");

        while !stop.is_cancelled() {
            tracing::debug!(queue = %self.queue_ref, "Waiting for messages from queue");

            // A receive dropped here may already have claimed items. They
            // reappear after the visibility timeout with their receive count
            // already incremented, so each loses one attempt of its budget.
            let items = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                received = self.queue.receive(&self.queue_ref, &self.request) => {
                    received.inspect_err(|e| {
                        tracing::error!(queue = %self.queue_ref, error = %e, "Failed to receive from queue");
                    })?
                }
            };

            if items.is_empty() {
                tracing::debug!(queue = %self.queue_ref, "Did not receive any messages in timeout");
                continue;
            }

            tracing::debug!(count = items.len(), "Received messages from queue");
            let outcomes = self.process_batch(&items).await?;
            let deleted = outcomes.iter().filter(|o| o.is_deleted()).count();
            tracing::debug!(deleted, received = items.len(), "Batch processed");
        }

        tracing::info!(queue = %self.queue_ref, "Stopping queue consumer loop");
        Ok(())
    }

    /// Handle every item of a batch in order.
    pub async fn process_batch(&self, items: &[QueueItem]) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.handle_item(item).await?);
        }
        self.stats.record_batch();
        Ok(outcomes)
    }

    /// Dispatch one item and delete it unless it should be retried.
    ///
    /// Only queue errors (the delete) are returned; delivery failures are
    /// reported to the monitor and turned into an outcome.
    pub async fn handle_item(&self, item: &QueueItem) -> Result<ItemOutcome> {
        let outcome = match self.deliver(item).await {
            Ok(Delivery::Sent { target, .. }) => {
                tracing::info!(message_id = %item.message_id, target = %target, "Notification delivered");
                ItemOutcome::Delivered
            }
            Ok(Delivery::Skipped(reason)) => {
                tracing::info!(message_id = %item.message_id, reason = ?reason, "Notification dropped");
                ItemOutcome::Dropped
            }
            Err(err) => {
                tracing::warn!(
                    message_id = %item.message_id,
                    receive_count = item.receive_count,
                    error = %err,
                    "Failed to send IRC notification"
                );
                self.monitor.report_error(
                    &err,
                    json!({
                        "queue": self.queue_ref.name,
                        "messageId": item.message_id,
                        "receiveCount": item.receive_count,
                        "maxRetries": MAX_RETRIES,
                    }),
                );

                if item.receive_count < MAX_RETRIES {
                    self.stats.record_retained();
                    return Ok(ItemOutcome::Retained);
                }

                tracing::warn!(
                    message_id = %item.message_id,
                    receive_count = item.receive_count,
                    "Retry budget exhausted, dropping notification"
                );
                ItemOutcome::Abandoned
            }
        };

        self.queue
            .delete(&self.queue_ref, &item.receipt_handle)
            .await
            .inspect_err(|e| {
                tracing::error!(message_id = %item.message_id, error = %e, "Failed to delete message from queue");
            })?;

        match outcome {
            ItemOutcome::Delivered => self.stats.record_delivered(),
            ItemOutcome::Dropped => self.stats.record_dropped(),
            ItemOutcome::Abandoned => self.stats.record_abandoned(),
            ItemOutcome::Retained => {}
        }
        Ok(outcome)
    }

    async fn deliver(&self, item: &QueueItem) -> Result<Delivery> {
        let notification: Notification = serde_json::from_str(&item.body)?;
        self.dispatcher.dispatch(&notification).await
    }
}
