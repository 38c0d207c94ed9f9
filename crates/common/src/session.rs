//! The chat protocol session boundary.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{BridgeError, Result};
use crate::types::SessionState;

/// Acknowledgement handle for a channel join request.
///
/// The protocol has no reliable failure signal for joins, so the only thing a
/// caller can wait for is the confirmation itself.
#[derive(Debug)]
pub enum JoinAck {
    /// The session already holds membership of the channel.
    Member,
    /// Resolves when the server confirms the join. The sender is dropped if
    /// the connection goes away first.
    Pending(oneshot::Receiver<()>),
}

/// How a `join_channel` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    AlreadyMember,
    Confirmed,
    /// No confirmation within the wait. Treated as a soft success.
    TimedOut,
}

#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Connect and complete registration. Connecting while already connected
    /// succeeds.
    async fn connect(&self) -> Result<()>;

    /// Ask the server for channel membership without waiting.
    async fn request_join(&self, channel: &str) -> Result<JoinAck>;

    /// Join a channel, resolving on confirmation or after `wait`, whichever
    /// comes first.
    async fn join_channel(&self, channel: &str, wait: Duration) -> Result<JoinOutcome> {
        match self.request_join(channel).await? {
            JoinAck::Member => Ok(JoinOutcome::AlreadyMember),
            JoinAck::Pending(ack) => match tokio::time::timeout(wait, ack).await {
                Ok(Ok(())) => Ok(JoinOutcome::Confirmed),
                Ok(Err(_)) => Err(BridgeError::ConnectionClosed),
                Err(_) => {
                    tracing::debug!(channel, "Timed out joining channel, may be ok. Proceeding");
                    Ok(JoinOutcome::TimedOut)
                }
            },
        }
    }

    /// Post a message to a user or channel. No delivery acknowledgement.
    async fn send(&self, target: &str, message: &str) -> Result<()>;

    /// Close the connection. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    fn state(&self) -> SessionState;
}
