use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters of what the consumer did with received items.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    retained: AtomicU64,
    abandoned: AtomicU64,
    batches: AtomicU64,
    last_batch_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Sent and deleted
    pub delivered: u64,
    /// Deleted without sending (invalid channel or no target)
    pub dropped: u64,
    /// Failed and left on the queue for redelivery
    pub retained: u64,
    /// Failed with the retry budget exhausted, deleted
    pub abandoned: u64,
    pub batches: u64,
    pub last_batch_at: Option<DateTime<Utc>>,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retained(&self) {
        self.retained.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        *self.last_batch_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retained: self.retained.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            last_batch_at: *self.last_batch_at.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let stats = DeliveryStats::new();
        stats.record_delivered();
        stats.record_delivered();
        stats.record_dropped();
        stats.record_retained();
        stats.record_abandoned();
        stats.record_batch();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.delivered, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.retained, 1);
        assert_eq!(snapshot.abandoned, 1);
        assert_eq!(snapshot.batches, 1);
        assert!(snapshot.last_batch_at.is_some());
    }
}
