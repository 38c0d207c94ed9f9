use std::net::SocketAddr;

use serde::Deserialize;

/// Connection settings for the IRC server the bridge delivers to.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// Server hostname (also used as the TLS server name)
    pub server: String,

    /// Server port
    pub port: u16,

    /// Nickname to register with
    pub nick: String,

    /// Username (ident) sent in `USER`
    pub user_name: String,

    /// Real name sent in `USER`
    pub real_name: String,

    /// Server password sent in `PASS` before registration
    pub password: String,

    /// Connect over TLS (default: true)
    pub secure: bool,

    /// Log every raw protocol line (default: false)
    pub debug: bool,
}

impl IrcConfig {
    /// `host:port` string used when opening the TCP connection.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

/// Global bridge configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// IRC connection settings
    pub irc: IrcConfig,

    /// Name of the queue to consume notifications from
    pub queue_name: String,

    /// Redis connection string backing the queue
    pub redis_url: String,

    /// Optional bind address for the health endpoint
    pub health_addr: Option<SocketAddr>,
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            irc: IrcConfig {
                server: required("IRC_SERVER")?,
                port: required("IRC_PORT")?
                    .parse()
                    .map_err(|_| anyhow::anyhow!("IRC_PORT must be a valid u16"))?,
                nick: required("IRC_NICK")?,
                user_name: required("IRC_USER_NAME")?,
                real_name: required("IRC_REAL_NAME")?,
                password: required("IRC_PASSWORD")?,
                secure: flag("IRC_SECURE", true)?,
                debug: flag("IRC_DEBUG", false)?,
            },
            queue_name: required("QUEUE_NAME")?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            health_addr: std::env::var("HEALTH_ADDR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| {
                    v.parse()
                        .map_err(|_| anyhow::anyhow!("HEALTH_ADDR must be a socket address"))
                })
                .transpose()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, once the bridge is running.
    pub fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("IRC_SERVER", &self.irc.server),
            ("IRC_NICK", &self.irc.nick),
            ("IRC_USER_NAME", &self.irc.user_name),
            ("IRC_REAL_NAME", &self.irc.real_name),
            ("IRC_PASSWORD", &self.irc.password),
            ("QUEUE_NAME", &self.queue_name),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                anyhow::bail!("{name} must not be empty");
            }
        }
        if self.irc.port == 0 {
            anyhow::bail!("IRC_PORT must be non-zero");
        }
        if self.irc.nick.contains(' ') {
            anyhow::bail!("IRC_NICK must not contain spaces");
        }
        Ok(())
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{name} environment variable is required"))
}

fn flag(name: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(name) {
        Ok(value) => parse_flag(&value)
            .ok_or_else(|| anyhow::anyhow!("{name} must be a boolean (true/false)")),
        Err(_) => Ok(default),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
