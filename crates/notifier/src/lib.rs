//! Notification delivery: drains the notification queue into the IRC session.
//!
//! - [`dispatcher`] validates one notification and hands it to the session
//! - [`consumer`] polls the queue and decides what gets deleted
//! - [`bridge`] wires both together and owns startup / shutdown

pub mod bridge;
pub mod consumer;
pub mod dispatcher;
pub mod stats;

pub use bridge::NotifyBridge;
pub use consumer::{ItemOutcome, MAX_RETRIES, QueueConsumer};
pub use dispatcher::{Delivery, Dispatcher, SkipReason};
pub use stats::{DeliveryStats, StatsSnapshot};
