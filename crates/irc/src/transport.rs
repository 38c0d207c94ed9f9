//! TCP and TLS transport to the IRC server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;

use herald_common::config::IrcConfig;
use herald_common::error::{BridgeError, Result};

/// Upper bound on TCP connect plus TLS handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// A byte stream an IRC connection can run over.
pub trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> IrcStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Opens the stream for a new connection. The session calls it on `connect`
/// and again for every lazy reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &IrcConfig) -> Result<Box<dyn IrcStream>>;
}

/// Connector that dials the configured server over TCP, with TLS when
/// `secure` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, config: &IrcConfig) -> Result<Box<dyn IrcStream>> {
        let stream: Box<dyn IrcStream> = match connect(config).await? {
            Transport::Plain(tcp) => Box::new(tcp),
            Transport::Tls(tls) => tls,
        };
        Ok(stream)
    }
}

/// Open the transport described by `config`.
pub async fn connect(config: &IrcConfig) -> Result<Transport> {
    tokio::time::timeout(CONNECT_TIMEOUT, establish(config))
        .await
        .map_err(|_| {
            BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connecting to {} timed out", config.address()),
            ))
        })?
}

async fn establish(config: &IrcConfig) -> Result<Transport> {
    let mode = if config.secure { "TLS" } else { "plain" };
    tracing::debug!(server = %config.address(), mode, "Opening IRC transport");

    let tcp = TcpStream::connect((config.server.as_str(), config.port)).await?;
    tcp.set_nodelay(true)?;

    if !config.secure {
        return Ok(Transport::Plain(tcp));
    }

    let connector = TlsConnector::from(Arc::new(tls_config()));
    let server_name = rustls::pki_types::ServerName::try_from(config.server.clone())
        .map_err(|e| BridgeError::Tls(format!("invalid server name {}: {e}", config.server)))?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| BridgeError::Tls(format!("handshake with {} failed: {e}", config.address())))?;

    tracing::debug!(server = %config.address(), "TLS handshake complete");
    Ok(Transport::Tls(Box::new(tls)))
}

fn tls_config() -> rustls::ClientConfig {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
