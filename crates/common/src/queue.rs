use async_trait::async_trait;

use crate::error::Result;
use crate::types::{QueueItem, QueueRef, ReceiptHandle, ReceiveRequest};

/// The queue service boundary consumed by the bridge.
///
/// Implementations must provide at-least-once delivery: a received item that
/// is not deleted within its visibility timeout becomes receivable again with
/// a higher receive count.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Create the queue if needed and return its identity. Idempotent.
    async fn create_queue(&self, name: &str) -> Result<QueueRef>;

    /// Receive up to `request.max_messages` items, waiting up to
    /// `request.wait` for the first one.
    async fn receive(&self, queue: &QueueRef, request: &ReceiveRequest) -> Result<Vec<QueueItem>>;

    /// Permanently remove a received item.
    async fn delete(&self, queue: &QueueRef, receipt: &ReceiptHandle) -> Result<()>;
}
