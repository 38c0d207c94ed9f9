//! The task that owns the socket.
//!
//! One task per connection reads server lines and writes queued outbound
//! lines. Callers never touch the socket; they push [`Outbound`] commands
//! over a bounded channel.

use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use herald_common::config::IrcConfig;
use herald_common::error::{BridgeError, Result};
use herald_common::monitor::Monitor;
use herald_common::types::SessionState;

use crate::message::{Message, irc_lowercase, is_line_safe};
use crate::numerics;
use crate::session::Shared;

/// Nickname variants tried when the configured one is taken.
const MAX_NICK_ATTEMPTS: u32 = 5;

pub(crate) enum Outbound {
    Line(String),
    Quit(String),
}

pub(crate) struct ConnectionContext {
    pub config: IrcConfig,
    pub shared: Arc<Shared>,
    pub monitor: Arc<dyn Monitor>,
}

/// Per-connection protocol state.
struct Protocol<'a> {
    ctx: &'a ConnectionContext,
    welcome: Option<oneshot::Sender<Result<String>>>,
    nick_attempts: u32,
    /// Set once QUIT has been written; the server's closing ERROR is expected.
    quitting: bool,
    /// An ERROR line was already reported; the close that follows is not.
    server_error: bool,
}

/// Drive one connection until the server closes it, a fatal protocol error
/// occurs, or the session quits.
pub(crate) async fn run<S>(
    stream: S,
    ctx: ConnectionContext,
    outbound: mpsc::Receiver<Outbound>,
    welcome: oneshot::Sender<Result<String>>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut protocol = Protocol {
        ctx: &ctx,
        welcome: Some(welcome),
        nick_attempts: 0,
        quitting: false,
        server_error: false,
    };

    let result = protocol.pump(stream, outbound).await;

    ctx.shared.mark_disconnected();

    match protocol.welcome.take() {
        Some(welcome) => {
            let _ = welcome.send(Err(result.err().unwrap_or(BridgeError::ConnectionClosed)));
        }
        None if !protocol.quitting && !protocol.server_error => {
            let err = result.err().unwrap_or(BridgeError::ConnectionClosed);
            tracing::warn!(server = %ctx.config.address(), error = %err, "IRC connection lost");
            ctx.monitor
                .report_error(&err, json!({ "server": ctx.config.address() }));
        }
        None => {
            tracing::info!(server = %ctx.config.address(), "IRC connection closed");
        }
    }
}

impl Protocol<'_> {
    async fn pump<S>(&mut self, stream: S, mut outbound: mpsc::Receiver<Outbound>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        self.register(&mut writer).await?;

        let mut buf = Vec::new();
        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => {
                    if read? == 0 {
                        return Ok(());
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    buf.clear();
                    self.handle_line(&line, &mut writer).await?;
                }
                command = outbound.recv(), if !self.quitting => {
                    match command {
                        Some(Outbound::Line(line)) => self.write(&mut writer, &line).await?,
                        Some(Outbound::Quit(reason)) => {
                            self.quitting = true;
                            self.write(&mut writer, &format!("QUIT :{reason}")).await?;
                        }
                        None => {
                            self.quitting = true;
                            self.write(&mut writer, "QUIT").await?;
                        }
                    }
                }
            }
        }
    }

    async fn register<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let config = &self.ctx.config;
        self.write(writer, &format!("PASS {}", config.password)).await?;
        self.write(writer, &format!("NICK {}", config.nick)).await?;
        self.write(
            writer,
            &format!("USER {} 8 * :{}", config.user_name, config.real_name),
        )
        .await
    }

    async fn handle_line<W: AsyncWrite + Unpin>(&mut self, line: &str, writer: &mut W) -> Result<()> {
        let raw = line.trim_end_matches(['\r', '\n']);
        if raw.is_empty() {
            return Ok(());
        }
        self.log_line("<<", raw);

        let Some(msg) = Message::parse(raw) else {
            tracing::debug!(line = raw, "Ignoring unparseable IRC line");
            return Ok(());
        };
        let ctx = self.ctx;
        let shared = &ctx.shared;
        let registered = self.welcome.is_none();

        match msg.command.as_str() {
            "PING" => {
                let token = msg.trailing().unwrap_or_default();
                self.write(writer, &format!("PONG :{token}")).await?;
            }
            "001" => {
                let nick = msg
                    .params
                    .first()
                    .cloned()
                    .unwrap_or_else(|| self.ctx.config.nick.clone());
                shared.set_nick(&nick);
                shared.set_state(SessionState::Connected);
                tracing::info!(nick = %nick, server = %self.ctx.config.address(), "Registered with IRC server");
                if let Some(welcome) = self.welcome.take() {
                    let _ = welcome.send(Ok(nick));
                }
            }
            "433" if !registered => {
                self.nick_attempts += 1;
                if self.nick_attempts > MAX_NICK_ATTEMPTS {
                    return Err(BridgeError::Registration(format!(
                        "nickname {} and {MAX_NICK_ATTEMPTS} variants are in use",
                        self.ctx.config.nick
                    )));
                }
                let alternative = format!("{}{}", self.ctx.config.nick, self.nick_attempts);
                tracing::warn!(nick = %alternative, "Nickname in use, retrying");
                self.write(writer, &format!("NICK {alternative}")).await?;
            }
            "464" | "465" if !registered => {
                let reason = msg.trailing().unwrap_or("rejected by server");
                return Err(BridgeError::Registration(reason.to_string()));
            }
            "ERROR" if !registered => {
                let reason = msg.trailing().unwrap_or("server closed the link");
                return Err(BridgeError::Registration(reason.to_string()));
            }
            "ERROR" if self.quitting => {
                tracing::debug!(reason = ?msg.trailing(), "Server closed link after QUIT");
            }
            "ERROR" => {
                self.server_error = true;
                self.report(&msg, "error");
            }
            "JOIN" => {
                if self.is_self(&msg)
                    && let Some(channel) = msg.params.first()
                {
                    tracing::debug!(channel = %channel, "Joined channel");
                    shared.confirm_join(&irc_lowercase(channel));
                }
            }
            "PART" => {
                if self.is_self(&msg)
                    && let Some(channel) = msg.params.first()
                {
                    shared.remove_channel(&irc_lowercase(channel));
                }
            }
            "KICK" => {
                let kicked = msg.params.get(1).map(|n| irc_lowercase(n));
                if kicked.as_deref() == Some(irc_lowercase(&shared.nick()).as_str())
                    && let Some(channel) = msg.params.first()
                {
                    tracing::warn!(channel = %channel, by = ?msg.source_nick(), "Kicked from channel");
                    shared.remove_channel(&irc_lowercase(channel));
                }
            }
            "NICK" => {
                if self.is_self(&msg)
                    && let Some(nick) = msg.params.first()
                {
                    shared.set_nick(nick);
                }
            }
            "PONG" | "PRIVMSG" | "NOTICE" | "MODE" | "TOPIC" | "QUIT" | "INVITE" | "CAP" => {
                tracing::trace!(command = %msg.command, "IRC message");
            }
            _ => match msg.numeric() {
                Some(code) if numerics::is_error(code) => {
                    let name = numerics::command_name(code).unwrap_or("err_unknown");
                    if numerics::is_benign(name) {
                        tracing::debug!(command = name, params = ?msg.params, "Ignoring benign IRC error");
                    } else {
                        self.report(&msg, name);
                    }
                }
                Some(code) if numerics::command_name(code).is_some() => {
                    tracing::trace!(command = %msg.command, "IRC reply");
                }
                _ => self.ctx.monitor.notice(raw),
            },
        }

        Ok(())
    }

    fn is_self(&self, msg: &Message) -> bool {
        msg.source_nick()
            .is_some_and(|nick| irc_lowercase(nick) == irc_lowercase(&self.ctx.shared.nick()))
    }

    fn report(&self, msg: &Message, name: &str) {
        let err = BridgeError::Protocol("irc_error".to_string());
        self.ctx.monitor.report_error(
            &err,
            json!({
                "command": name,
                "rawCommand": msg.command,
                "prefix": msg.prefix,
                "args": msg.params,
            }),
        );
    }

    async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W, line: &str) -> Result<()> {
        if !is_line_safe(line) {
            tracing::error!("Refusing to write IRC line containing CR, LF or NUL");
            return Ok(());
        }
        if line.starts_with("PASS ") {
            self.log_line(">>", "PASS ****");
        } else {
            self.log_line(">>", line);
        }
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
        Ok(())
    }

    fn log_line(&self, direction: &str, line: &str) {
        if self.ctx.config.debug {
            tracing::info!(direction, line, "IRC raw");
        } else {
            tracing::trace!(direction, line, "IRC raw");
        }
    }
}
