use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A notification as produced onto the queue.
///
/// Exactly one of `channel` / `user` is the delivery target. When both are
/// present the user wins; empty strings count as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub message: String,
}

impl Notification {
    pub fn to_channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            user: None,
            message: message.into(),
        }
    }

    pub fn to_user(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: None,
            user: Some(user.into()),
            message: message.into(),
        }
    }

    /// Channel name, if one was given and is non-empty.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref().filter(|c| !c.is_empty())
    }

    /// User nickname, if one was given and is non-empty.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref().filter(|u| !u.is_empty())
    }

    /// The recipient of the `PRIVMSG`: the user if present, else the channel.
    pub fn target(&self) -> Option<&str> {
        self.user().or_else(|| self.channel())
    }
}

/// Identity of a provisioned queue, as returned by the queue service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueRef {
    pub name: String,
}

impl std::fmt::Display for QueueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Opaque handle required to delete a received item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(pub String);

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from the queue, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub message_id: String,
    pub receipt_handle: ReceiptHandle,
    /// Raw UTF-8 JSON body
    pub body: String,
    /// Approximate number of times this item has been received, including
    /// the current receive (first delivery = 1)
    pub receive_count: u32,
}

/// Parameters of a single receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Upper bound on items returned
    pub max_messages: u32,
    /// How long to wait for at least one item before returning empty
    pub wait: Duration,
    /// How long received items stay hidden from other receives
    pub visibility_timeout: Duration,
}

/// Lifecycle state of the chat protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Draining,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Draining => write!(f, "draining"),
        }
    }
}
