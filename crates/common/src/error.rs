use thiserror::Error;

/// Common error type used across the bridge crates.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IRC registration failed: {0}")]
    Registration(String),

    #[error("IRC protocol error: {0}")]
    Protocol(String),

    #[error("IRC connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
