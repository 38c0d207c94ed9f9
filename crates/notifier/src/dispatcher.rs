//! Delivery of a single decoded notification.

use std::sync::Arc;
use std::time::Duration;

use herald_common::error::Result;
use herald_common::session::{ChatSession, JoinOutcome};
use herald_common::types::Notification;

/// How long to wait for a channel join confirmation before sending anyway.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum channel name length, prefix excluded.
const MAX_CHANNEL_CHARS: usize = 199;

/// Whether `name` is a channel we are willing to join: a `#` or `&` prefix
/// followed by 1–199 characters, none of which is a space, a comma, BEL or a
/// line terminator (CR, LF, NUL).
pub fn is_valid_channel(name: &str) -> bool {
    let mut chars = name.chars();
    if !matches!(chars.next(), Some('#' | '&')) {
        return false;
    }

    let mut len = 0;
    for c in chars {
        if matches!(c, ' ' | ',' | '\u{7}' | '\r' | '\n' | '\0') {
            return false;
        }
        len += 1;
    }
    (1..=MAX_CHANNEL_CHARS).contains(&len)
}

/// Why a notification was dropped without contacting the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    InvalidChannel(String),
    NoTarget,
}

/// Result of a dispatch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent {
        target: String,
        /// How the channel join resolved, if a channel was given
        join: Option<JoinOutcome>,
    },
    Skipped(SkipReason),
}

/// Routes notifications to the chat session.
pub struct Dispatcher {
    session: Arc<dyn ChatSession>,
    join_timeout: Duration,
}

impl Dispatcher {
    pub fn new(session: Arc<dyn ChatSession>) -> Self {
        Self {
            session,
            join_timeout: JOIN_TIMEOUT,
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Deliver one notification.
    ///
    /// An invalid channel or a missing target is not an error: the
    /// notification is skipped and the caller should treat it as handled.
    /// Join and send failures are returned as errors.
    pub async fn dispatch(&self, notification: &Notification) -> Result<Delivery> {
        if let Some(channel) = notification.channel()
            && !is_valid_channel(channel)
        {
            tracing::debug!(channel, "IRC channel has invalid format. Not attempting to send");
            return Ok(Delivery::Skipped(SkipReason::InvalidChannel(
                channel.to_string(),
            )));
        }

        let Some(target) = notification.target() else {
            tracing::debug!("Notification has neither channel nor user. Not attempting to send");
            return Ok(Delivery::Skipped(SkipReason::NoTarget));
        };

        tracing::debug!(target, message = %notification.message, "Sending message");

        let join = match notification.channel() {
            Some(channel) => Some(self.session.join_channel(channel, self.join_timeout).await?),
            None => None,
        };

        self.session.send(target, &notification.message).await?;

        Ok(Delivery::Sent {
            target: target.to_string(),
            join,
        })
    }
}
