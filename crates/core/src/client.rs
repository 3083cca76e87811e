/// Contract of the anonymizing-network client
///
/// The client process owns circuits and onion service lifecycle. The
/// transport only needs a dialer that reaches `.onion` hosts and a way to
/// publish an onion service whose traffic arrives on a local listener.

use crate::context::{wait_for_flag, Context};
use crate::socks;
use async_trait::async_trait;
use oniontransport_common::{OnionError, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::debug;

/// A raw duplex byte stream
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawStream for T {}

pub type BoxedStream = Box<dyn RawStream>;

/// Opens raw streams over the anonymizing network
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, network: &str, addr: &str) -> Result<BoxedStream>;
}

/// Listener handed out by the client for a published onion service
#[async_trait]
pub trait RawListener: Send + Sync {
    async fn accept(&self) -> Result<(BoxedStream, SocketAddr)>;

    fn close(&self) -> Result<()>;

    fn local_addr(&self) -> Result<SocketAddr>;
}

/// Options for obtaining a dialer
#[derive(Debug, Clone, Default)]
pub struct DialConf {
    /// SOCKS address to use instead of the client's own
    pub proxy_addr: Option<String>,
}

/// Options for publishing an onion service
#[derive(Debug, Clone, Default)]
pub struct ListenConf {
    /// Virtual ports the service exposes
    pub remote_ports: Vec<u16>,
}

/// A published onion service
pub struct OnionService {
    /// Service id, without ".onion"
    pub id: String,
    pub local_listener: Box<dyn RawListener>,
}

impl std::fmt::Debug for OnionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnionService").field("id", &self.id).finish()
    }
}

/// Handle to the anonymizing-network client
#[async_trait]
pub trait OnionClient: Send + Sync {
    async fn dialer(&self, ctx: &Context, conf: Option<&DialConf>) -> Result<Arc<dyn Dialer>>;

    async fn listen(&self, ctx: &Context, conf: &ListenConf) -> Result<OnionService>;
}

/// Dials through a SOCKS5 proxy, passing hostnames through unresolved
#[derive(Debug, Clone)]
pub struct SocksDialer {
    proxy: String,
}

impl SocksDialer {
    pub fn new(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
        }
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }
}

#[async_trait]
impl Dialer for SocksDialer {
    async fn dial(&self, network: &str, addr: &str) -> Result<BoxedStream> {
        if !network.starts_with("tcp") {
            return Err(OnionError::Unsupported(format!(
                "network {} over SOCKS",
                network
            )));
        }

        let (host, port) = split_host_port(addr)?;
        let stream = socks::connect(&self.proxy, host, port).await?;
        Ok(Box::new(stream))
    }
}

/// Split `host:port` or `[v6]:port`
fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| OnionError::malformed(format!("missing port in address {}", addr)))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let port = port
        .parse()
        .map_err(|_| OnionError::malformed(format!("invalid port in address {}", addr)))?;
    Ok((host, port))
}

/// Dial-only client talking to the SOCKS port of a running anonymizing client
///
/// Publishing services needs the client's control interface, so `listen`
/// always fails.
#[derive(Debug, Clone)]
pub struct SocksClient {
    proxy: String,
}

impl SocksClient {
    pub fn new(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
        }
    }
}

#[async_trait]
impl OnionClient for SocksClient {
    async fn dialer(&self, _ctx: &Context, conf: Option<&DialConf>) -> Result<Arc<dyn Dialer>> {
        let proxy = conf
            .and_then(|c| c.proxy_addr.clone())
            .unwrap_or_else(|| self.proxy.clone());
        Ok(Arc::new(SocksDialer::new(proxy)))
    }

    async fn listen(&self, _ctx: &Context, _conf: &ListenConf) -> Result<OnionService> {
        Err(OnionError::Unsupported(
            "publishing onion services over a SOCKS-only client".to_string(),
        ))
    }
}

/// Local TCP listener the anonymizing client forwards service traffic to
pub struct LocalListener {
    inner: TcpListener,
    closed: watch::Sender<bool>,
}

impl LocalListener {
    pub fn new(inner: TcpListener) -> Self {
        let (closed, _) = watch::channel(false);
        Self { inner, closed }
    }

    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self::new(TcpListener::bind(addr).await?))
    }
}

#[async_trait]
impl RawListener for LocalListener {
    async fn accept(&self) -> Result<(BoxedStream, SocketAddr)> {
        let closed = *self.closed.borrow();
        if closed {
            return Err(listener_closed());
        }

        tokio::select! {
            res = self.inner.accept() => {
                let (stream, peer) = res?;
                debug!("Accepted local connection from {}", peer);
                Ok((Box::new(stream) as BoxedStream, peer))
            }
            _ = wait_for_flag(self.closed.subscribe()) => Err(listener_closed()),
        }
    }

    /// Wakes pending and future `accept` calls with an error
    fn close(&self) -> Result<()> {
        self.closed.send_replace(true);
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }
}

fn listener_closed() -> OnionError {
    OnionError::Io(io::Error::new(io::ErrorKind::NotConnected, "listener closed"))
}
