//! [`ChatSession`] implementation over a single IRC connection.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use herald_common::config::IrcConfig;
use herald_common::error::{BridgeError, Result};
use herald_common::monitor::Monitor;
use herald_common::session::{ChatSession, JoinAck};
use herald_common::types::SessionState;

use crate::connection::{self, ConnectionContext, Outbound};
use crate::message::{irc_lowercase, is_line_safe, privmsg_text_limit, split_text};
use crate::transport::{Connector, TcpConnector};

/// How long registration may take before `connect` gives up.
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How long `disconnect` waits for the server to close after QUIT.
const QUIT_GRACE: Duration = Duration::from_secs(5);

const QUIT_MESSAGE: &str = "Shutting down";

/// Outbound lines buffered ahead of the socket.
const OUTBOUND_BUFFER: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Reject a channel or target that would break out of its protocol line.
fn check_param(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(' ') || !is_line_safe(value) {
        return Err(BridgeError::Protocol(format!("invalid {kind} {value:?}")));
    }
    Ok(())
}

/// State shared between the session handle and its connection task.
pub(crate) struct Shared {
    state: Mutex<SessionState>,
    nick: Mutex<String>,
    /// Channels we hold membership of, casemapped.
    channels: Mutex<HashSet<String>>,
    /// Join acknowledgements waiting for our own JOIN echo, keyed by casemapped channel.
    pending_joins: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl Shared {
    fn new(nick: &str) -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            nick: Mutex::new(nick.to_string()),
            channels: Mutex::new(HashSet::new()),
            pending_joins: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    pub(crate) fn nick(&self) -> String {
        lock(&self.nick).clone()
    }

    pub(crate) fn set_nick(&self, nick: &str) {
        *lock(&self.nick) = nick.to_string();
    }

    pub(crate) fn is_member(&self, channel: &str) -> bool {
        lock(&self.channels).contains(channel)
    }

    pub(crate) fn confirm_join(&self, channel: &str) {
        lock(&self.channels).insert(channel.to_string());
        if let Some(waiters) = lock(&self.pending_joins).remove(channel) {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }

    pub(crate) fn remove_channel(&self, channel: &str) {
        lock(&self.channels).remove(channel);
    }

    /// Waiters whose receiver is gone (the join wait timed out) are pruned
    /// on the way in.
    fn add_join_waiter(&self, channel: &str, waiter: oneshot::Sender<()>) {
        let mut pending = lock(&self.pending_joins);
        let waiters = pending.entry(channel.to_string()).or_default();
        waiters.retain(|w| !w.is_closed());
        waiters.push(waiter);
    }

    #[cfg(test)]
    fn pending_join_count(&self, channel: &str) -> usize {
        lock(&self.pending_joins).get(channel).map_or(0, Vec::len)
    }

    /// Forget everything tied to the connection. Dropping the pending join
    /// senders wakes their waiters with an error.
    pub(crate) fn mark_disconnected(&self) {
        self.set_state(SessionState::Disconnected);
        lock(&self.channels).clear();
        lock(&self.pending_joins).clear();
    }
}

struct Connection {
    outbound: mpsc::Sender<Outbound>,
    task: JoinHandle<()>,
}

/// A persistent IRC connection.
///
/// `connect` registers with the server; afterwards `request_join` and `send`
/// queue lines onto the connection task. If the connection drops without
/// `disconnect` having been called, the next `request_join` or `send`
/// reconnects.
pub struct IrcSession {
    config: IrcConfig,
    monitor: Arc<dyn Monitor>,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    conn: tokio::sync::Mutex<Option<Connection>>,
    closed: AtomicBool,
}

impl IrcSession {
    pub fn new(config: IrcConfig, monitor: Arc<dyn Monitor>) -> Self {
        let shared = Arc::new(Shared::new(&config.nick));
        Self {
            config,
            monitor,
            connector: Arc::new(TcpConnector),
            shared,
            conn: tokio::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Open connections through `connector` instead of dialing the
    /// configured server directly.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Nickname currently registered (may differ from the configured one).
    pub fn nick(&self) -> String {
        self.shared.nick()
    }

    /// Run registration over an already-established stream instead of
    /// opening a transport from the configuration.
    pub async fn connect_over<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.closed.store(false, Ordering::SeqCst);
        let mut conn = self.conn.lock().await;
        if self.is_live(&conn) {
            tracing::debug!("IRC session already connected");
            return Ok(());
        }
        self.register(&mut conn, stream).await
    }

    fn is_live(&self, conn: &Option<Connection>) -> bool {
        conn.as_ref().is_some_and(|c| !c.task.is_finished())
            && self.shared.state() == SessionState::Connected
    }

    async fn open(&self, conn: &mut Option<Connection>) -> Result<()> {
        self.shared.set_state(SessionState::Connecting);
        let stream = match self.connector.open(&self.config).await {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };
        self.register(conn, stream).await
    }

    async fn register<S>(&self, conn: &mut Option<Connection>, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if let Some(stale) = conn.take() {
            stale.task.abort();
        }
        self.shared.mark_disconnected();
        self.shared.set_state(SessionState::Connecting);
        self.shared.set_nick(&self.config.nick);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (welcome_tx, welcome_rx) = oneshot::channel();
        let ctx = ConnectionContext {
            config: self.config.clone(),
            shared: self.shared.clone(),
            monitor: self.monitor.clone(),
        };
        let task = tokio::spawn(connection::run(stream, ctx, outbound_rx, welcome_tx));

        let outcome = match tokio::time::timeout(REGISTRATION_TIMEOUT, welcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BridgeError::ConnectionClosed),
            Err(_) => Err(BridgeError::Registration(format!(
                "no welcome from {} within {}s",
                self.config.address(),
                REGISTRATION_TIMEOUT.as_secs()
            ))),
        };

        match outcome {
            Ok(nick) => {
                tracing::info!(server = %self.config.address(), nick = %nick, "IRC session connected");
                *conn = Some(Connection {
                    outbound: outbound_tx,
                    task,
                });
                Ok(())
            }
            Err(e) => {
                task.abort();
                self.shared.mark_disconnected();
                tracing::error!(server = %self.config.address(), error = %e, "IRC registration failed");
                Err(e)
            }
        }
    }

    /// Outbound channel of a live connection, reconnecting if the previous
    /// one dropped on its own.
    async fn outbound(&self) -> Result<mpsc::Sender<Outbound>> {
        let mut conn = self.conn.lock().await;
        if !self.is_live(&conn) {
            if self.closed.load(Ordering::SeqCst) {
                return Err(BridgeError::NotConnected);
            }
            tracing::warn!(server = %self.config.address(), "IRC connection lost, reconnecting");
            self.open(&mut conn).await?;
        }
        conn.as_ref()
            .map(|c| c.outbound.clone())
            .ok_or(BridgeError::NotConnected)
    }
}

#[async_trait]
impl ChatSession for IrcSession {
    async fn connect(&self) -> Result<()> {
        self.closed.store(false, Ordering::SeqCst);
        let mut conn = self.conn.lock().await;
        if self.is_live(&conn) {
            tracing::debug!("IRC session already connected");
            return Ok(());
        }
        self.open(&mut conn).await
    }

    async fn request_join(&self, channel: &str) -> Result<JoinAck> {
        check_param("channel", channel)?;
        let outbound = self.outbound().await?;
        let key = irc_lowercase(channel);
        if self.shared.is_member(&key) {
            return Ok(JoinAck::Member);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared.add_join_waiter(&key, ack_tx);
        outbound
            .send(Outbound::Line(format!("JOIN {channel}")))
            .await
            .map_err(|_| BridgeError::ConnectionClosed)?;
        Ok(JoinAck::Pending(ack_rx))
    }

    async fn send(&self, target: &str, message: &str) -> Result<()> {
        check_param("message target", target)?;
        let outbound = self.outbound().await?;

        for chunk in split_text(message, privmsg_text_limit(target)) {
            outbound
                .send(Outbound::Line(format!("PRIVMSG {target} :{chunk}")))
                .await
                .map_err(|_| BridgeError::ConnectionClosed)?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let Some(mut conn) = self.conn.lock().await.take() else {
            return Ok(());
        };

        self.shared.set_state(SessionState::Draining);
        let _ = conn
            .outbound
            .send(Outbound::Quit(QUIT_MESSAGE.to_string()))
            .await;
        drop(conn.outbound);

        if tokio::time::timeout(QUIT_GRACE, &mut conn.task).await.is_err() {
            tracing::debug!("Server did not close the link after QUIT, aborting");
            conn.task.abort();
        }
        self.shared.mark_disconnected();
        tracing::info!(server = %self.config.address(), "IRC session disconnected");
        Ok(())
    }

    fn state(&self) -> SessionState {
        self.shared.state()
    }
}
