/// Name resolution through the anonymizing proxy
///
/// The proxied lookup primitive cannot be canceled. `OnionBackend` runs it as
/// a detached task and races its single result against the caller's context.
/// When the context wins, the task is left to finish on its own and whatever
/// it produces is discarded.

use crate::context::Context;
use crate::socks;
use async_trait::async_trait;
use oniontransport_common::{defaults, Multiaddr, OnionError, Protocol, Result};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// One resolved address, in the shape resolver callers consume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddrRecord {
    pub ip: IpAddr,
    /// IPv6 scope zone, never set by proxied lookups
    pub zone: Option<String>,
}

impl From<IpAddr> for IpAddrRecord {
    fn from(ip: IpAddr) -> Self {
        Self { ip, zone: None }
    }
}

/// Non-cancellable lookup of `name` through `proxy`
#[async_trait]
pub trait ProxyLookup: Send + Sync + 'static {
    async fn lookup_ip(&self, name: &str, proxy: &str) -> Result<Vec<IpAddr>>;
}

/// Lookup via the SOCKS RESOLVE extension
#[derive(Debug, Clone, Copy, Default)]
pub struct SocksLookup;

#[async_trait]
impl ProxyLookup for SocksLookup {
    async fn lookup_ip(&self, name: &str, proxy: &str) -> Result<Vec<IpAddr>> {
        Ok(socks::resolve(proxy, name).await?)
    }
}

/// Resolver backend contract
#[async_trait]
pub trait Backend: Send + Sync {
    async fn lookup_ip_addr(&self, ctx: &Context, name: &str) -> Result<Vec<IpAddrRecord>>;

    async fn lookup_txt(&self, ctx: &Context, name: &str) -> Result<Vec<String>>;
}

/// Backend resolving hostnames over the anonymizing network
#[derive(Clone)]
pub struct OnionBackend {
    proxy: String,
    lookup: Arc<dyn ProxyLookup>,
}

impl OnionBackend {
    /// An empty `proxy` selects the default SOCKS address
    pub fn new(proxy: impl Into<String>) -> Self {
        Self::with_lookup(proxy, Arc::new(SocksLookup))
    }

    pub fn with_lookup(proxy: impl Into<String>, lookup: Arc<dyn ProxyLookup>) -> Self {
        let proxy = proxy.into();
        let proxy = if proxy.is_empty() {
            defaults::SOCKS_ADDR.to_string()
        } else {
            proxy
        };
        Self { proxy, lookup }
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }
}

impl std::fmt::Debug for OnionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnionBackend")
            .field("proxy", &self.proxy)
            .finish()
    }
}

#[async_trait]
impl Backend for OnionBackend {
    async fn lookup_ip_addr(&self, ctx: &Context, name: &str) -> Result<Vec<IpAddrRecord>> {
        let (tx, rx) = oneshot::channel();
        let lookup = self.lookup.clone();
        let proxy = self.proxy.clone();
        let host = name.to_string();

        // Not aborted on cancellation: the task runs until the proxy answers,
        // then its send fails and the result is dropped.
        tokio::spawn(async move {
            let res = lookup.lookup_ip(&host, &proxy).await;
            let _ = tx.send(res);
        });

        tokio::select! {
            biased;
            err = ctx.done() => {
                debug!("Abandoning lookup of {}: {}", name, err);
                Err(err.into())
            }
            res = rx => match res {
                Ok(Ok(addrs)) => Ok(addrs.into_iter().map(IpAddrRecord::from).collect()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(OnionError::resolve(format!(
                    "lookup of {} ended without a result",
                    name
                ))),
            },
        }
    }

    async fn lookup_txt(&self, _ctx: &Context, _name: &str) -> Result<Vec<String>> {
        Err(OnionError::Unsupported(
            "resolving TXT records over the anonymizing network".to_string(),
        ))
    }
}

/// Multiaddr resolver on top of a backend
#[derive(Clone)]
pub struct Resolver {
    backend: Arc<dyn Backend>,
}

impl Resolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Resolver whose lookups go through the proxy at `proxy`
    pub fn onion(proxy: impl Into<String>) -> Self {
        Self::new(Arc::new(OnionBackend::new(proxy)))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Replace a leading `dns`, `dns4` or `dns6` segment with the addresses
    /// it resolves to. Other addresses are returned unchanged.
    pub async fn resolve(&self, ctx: &Context, addr: &Multiaddr) -> Result<Vec<Multiaddr>> {
        let (host, want_v4, want_v6) = match addr.iter().next() {
            Some(Protocol::Dns(host)) => (host, true, true),
            Some(Protocol::Dns4(host)) => (host, true, false),
            Some(Protocol::Dns6(host)) => (host, false, true),
            _ => return Ok(vec![addr.clone()]),
        };

        let records = self.backend.lookup_ip_addr(ctx, &host).await?;

        let mut resolved = Vec::with_capacity(records.len());
        for record in records {
            let first = match record.ip {
                IpAddr::V4(ip) if want_v4 => Protocol::Ip4(ip),
                IpAddr::V6(ip) if want_v6 => Protocol::Ip6(ip),
                _ => continue,
            };

            let mut out = Multiaddr::empty().with(first);
            for p in addr.iter().skip(1) {
                out.push(p);
            }
            resolved.push(out);
        }

        Ok(resolved)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}
