//! Queue service on top of Redis.
//!
//! Each queue is four keys:
//! - `pending`: LIST of message ids waiting to be received (FIFO)
//! - `inflight`: ZSET of received ids scored by the time they become visible again
//! - `bodies`: HASH id → body
//! - `receives`: HASH id → receive count
//!
//! Receiving runs a single Lua script, so re-queueing expired in-flight ids
//! and claiming new ones is atomic with respect to other consumers.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use tokio::time::Instant;
use uuid::Uuid;

use herald_common::error::{BridgeError, Result};
use herald_common::queue::QueueService;
use herald_common::types::{QueueItem, QueueRef, ReceiptHandle, ReceiveRequest};

/// Default key prefix for every queue key.
const DEFAULT_PREFIX: &str = "herald";

/// How often an empty long-poll re-checks the queue.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Hard cap on items returned by one receive.
const MAX_BATCH: u32 = 10;

/// KEYS: pending, inflight, bodies, receives
/// ARGV: now_ms, visibility_ms, max
///
/// Returns a list of `{id, body, receive_count}` triples.
const RECEIVE_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)
for i = #expired, 1, -1 do
  redis.call('ZREM', KEYS[2], expired[i])
  redis.call('LPUSH', KEYS[1], expired[i])
end
local out = {}
local max = tonumber(ARGV[3])
while #out < max do
  local id = redis.call('LPOP', KEYS[1])
  if not id then break end
  local body = redis.call('HGET', KEYS[3], id)
  if body then
    local count = redis.call('HINCRBY', KEYS[4], id, 1)
    redis.call('ZADD', KEYS[2], now + tonumber(ARGV[2]), id)
    table.insert(out, {id, body, count})
  end
end
return out
"#;

/// Redis key names for one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pub pending: String,
    pub inflight: String,
    pub bodies: String,
    pub receives: String,
}

impl QueueKeys {
    pub fn new(prefix: &str, queue: &str) -> Self {
        let base = format!("{prefix}:queue:{queue}");
        Self {
            pending: format!("{base}:pending"),
            inflight: format!("{base}:inflight"),
            bodies: format!("{base}:bodies"),
            receives: format!("{base}:receives"),
        }
    }
}

/// Redis implementation of [`QueueService`].
pub struct RedisQueue {
    redis: ConnectionManager,
    prefix: String,
    poll_interval: Duration,
    receive_script: Script,
}

impl RedisQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            prefix: DEFAULT_PREFIX.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            receive_script: Script::new(RECEIVE_SCRIPT),
        }
    }

    /// Use a different key prefix (isolates test runs sharing one Redis).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// How often an empty long-poll re-runs the receive script.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn keys(&self, queue: &QueueRef) -> QueueKeys {
        QueueKeys::new(&self.prefix, &queue.name)
    }

    fn registry_key(&self) -> String {
        format!("{}:queues", self.prefix)
    }

    /// Enqueue a raw body. Returns the new message id.
    pub async fn send_message(&self, queue: &QueueRef, body: &str) -> Result<String> {
        let keys = self.keys(queue);
        let id = Uuid::new_v4().to_string();
        let mut conn = self.redis.clone();

        let _: () = redis::pipe()
            .atomic()
            .hset(&keys.bodies, &id, body)
            .ignore()
            .rpush(&keys.pending, &id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(queue = %queue, message_id = %id, "Message enqueued");
        Ok(id)
    }

    /// Drop every message of the queue, pending or in flight.
    pub async fn purge(&self, queue: &QueueRef) -> Result<()> {
        let keys = self.keys(queue);
        let mut conn = self.redis.clone();

        let _: () = redis::pipe()
            .atomic()
            .del(&keys.pending)
            .ignore()
            .del(&keys.inflight)
            .ignore()
            .del(&keys.bodies)
            .ignore()
            .del(&keys.receives)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::info!(queue = %queue, "Queue purged");
        Ok(())
    }

    /// One pass of the receive script.
    async fn claim(&self, queue: &QueueRef, request: &ReceiveRequest) -> Result<Vec<QueueItem>> {
        let keys = self.keys(queue);
        let mut conn = self.redis.clone();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let max = request.max_messages.clamp(1, MAX_BATCH);

        let rows: Vec<(String, String, u32)> = self
            .receive_script
            .key(&keys.pending)
            .key(&keys.inflight)
            .key(&keys.bodies)
            .key(&keys.receives)
            .arg(now_ms)
            .arg(request.visibility_timeout.as_millis() as u64)
            .arg(max)
            .invoke_async(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, body, receive_count)| QueueItem {
                receipt_handle: ReceiptHandle(id.clone()),
                message_id: id,
                body,
                receive_count,
            })
            .collect())
    }
}

/// Queue names follow the same rules as hosted queue services: ASCII
/// alphanumerics, `-` and `_`, at most 80 characters.
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 80 {
        return Err(BridgeError::Queue(format!(
            "queue name must be 1-80 characters, got {}",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BridgeError::Queue(format!(
            "queue name '{name}' may only contain alphanumerics, '-' and '_'"
        )));
    }
    Ok(())
}

#[async_trait]
impl QueueService for RedisQueue {
    async fn create_queue(&self, name: &str) -> Result<QueueRef> {
        validate_queue_name(name)?;
        let mut conn = self.redis.clone();

        let added: i64 = redis::cmd("SADD")
            .arg(self.registry_key())
            .arg(name)
            .query_async(&mut conn)
            .await?;

        if added > 0 {
            tracing::info!(queue = name, "Queue created");
        } else {
            tracing::debug!(queue = name, "Queue already exists");
        }

        Ok(QueueRef {
            name: name.to_string(),
        })
    }

    async fn receive(&self, queue: &QueueRef, request: &ReceiveRequest) -> Result<Vec<QueueItem>> {
        let deadline = Instant::now() + request.wait;

        loop {
            let items = self.claim(queue, request).await?;
            if !items.is_empty() {
                return Ok(items);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(items);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn delete(&self, queue: &QueueRef, receipt: &ReceiptHandle) -> Result<()> {
        let keys = self.keys(queue);
        let mut conn = self.redis.clone();
        let id = receipt.0.as_str();

        let _: () = redis::pipe()
            .atomic()
            .zrem(&keys.inflight, id)
            .ignore()
            .hdel(&keys.bodies, id)
            .ignore()
            .hdel(&keys.receives, id)
            .ignore()
            .lrem(&keys.pending, 0, id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(queue = %queue, message_id = id, "Message deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys() {
        let keys = QueueKeys::new("herald", "irc");
        assert_eq!(keys.pending, "herald:queue:irc:pending");
        assert_eq!(keys.inflight, "herald:queue:irc:inflight");
        assert_eq!(keys.bodies, "herald:queue:irc:bodies");
        assert_eq!(keys.receives, "herald:queue:irc:receives");
    }

    #[test]
    fn test_validate_queue_name() {
        assert!(validate_queue_name("irc-notifications_v2").is_ok());
        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("has space").is_err());
        assert!(validate_queue_name("colon:breaks:keys").is_err());
        assert!(validate_queue_name(&"a".repeat(81)).is_err());
    }
}
