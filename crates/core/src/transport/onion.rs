use super::{Listener, OnionConn, OnionListener, SecuredConn, Transport, Upgrader};
use crate::address::{is_valid_onion_multiaddr, onion_endpoint};
use crate::client::{ListenConf, OnionClient};
use crate::context::Context;
use async_trait::async_trait;
use oniontransport_common::{
    Multiaddr, MultiaddrExt, Network, OnionError, PeerId, Result, TransportConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Builds a transport once the host stack supplies its upgrader
pub type TransportConstructor =
    Box<dyn Fn(Arc<dyn Upgrader>) -> Result<Arc<dyn Transport>> + Send + Sync>;

/// Transport dialing and listening through an anonymizing client
///
/// Clones share the client handle, the upgrader and the last listen address.
#[derive(Clone)]
pub struct OnionTransport {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn OnionClient>,
    dial_only_onion: bool,
    /// Address of the most recent successful `listen`
    laddr: RwLock<Option<Multiaddr>>,
    upgrader: Arc<dyn Upgrader>,
}

/// Where a dial is headed once the multiaddr is decoded
#[derive(Debug, Clone, PartialEq, Eq)]
enum DialTarget {
    Onion { host_port: String },
    Net { network: Network, addr: SocketAddr },
}

impl DialTarget {
    /// Plain network address first, then an onion endpoint
    fn from_multiaddr(raddr: &Multiaddr) -> Result<Self> {
        if let Some((network, addr)) = raddr.to_socket_addr() {
            return Ok(Self::Net { network, addr });
        }

        let onion = onion_endpoint(raddr).ok_or_else(|| {
            OnionError::malformed(format!(
                "{} is neither a network address nor an onion address",
                raddr
            ))
        })?;

        Ok(Self::Onion {
            host_port: onion.dial_target(),
        })
    }
}

impl OnionTransport {
    pub fn new(
        client: Arc<dyn OnionClient>,
        dial_only_onion: bool,
        upgrader: Arc<dyn Upgrader>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                dial_only_onion,
                laddr: RwLock::new(None),
                upgrader,
            }),
        }
    }

    pub fn from_config(
        client: Arc<dyn OnionClient>,
        config: &TransportConfig,
        upgrader: Arc<dyn Upgrader>,
    ) -> Self {
        Self::new(client, config.dial_only_onion, upgrader)
    }

    /// Constructor for host setup code that supplies the upgrader later
    pub fn constructor(client: Arc<dyn OnionClient>, dial_only_onion: bool) -> TransportConstructor {
        Box::new(move |upgrader| {
            let transport: Arc<dyn Transport> =
                Arc::new(Self::new(client.clone(), dial_only_onion, upgrader));
            Ok(transport)
        })
    }

    pub fn dial_only_onion(&self) -> bool {
        self.inner.dial_only_onion
    }

    /// Address of the most recent successful `listen`, if any
    pub async fn local_multiaddr(&self) -> Option<Multiaddr> {
        self.inner.laddr.read().await.clone()
    }

    fn as_transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Transport for OnionTransport {
    fn can_dial(&self, addr: &Multiaddr) -> bool {
        if self.inner.dial_only_onion {
            is_valid_onion_multiaddr(addr)
        } else {
            is_valid_onion_multiaddr(addr) || addr.is_tcp()
        }
    }

    fn protocols(&self) -> Vec<&'static str> {
        if self.inner.dial_only_onion {
            vec!["onion"]
        } else {
            vec!["onion", "tcp"]
        }
    }

    /// The onion transport is not a proxy from the host stack's point of view
    fn proxy(&self) -> bool {
        false
    }

    async fn dial(
        &self,
        ctx: &Context,
        raddr: &Multiaddr,
        peer: PeerId,
    ) -> Result<Box<dyn SecuredConn>> {
        let target = DialTarget::from_multiaddr(raddr)?;

        let dialer = ctx
            .run(self.inner.client.dialer(ctx, None))
            .await
            .map_err(|e| unavailable("obtain dialer", e))?;

        let raw = match &target {
            DialTarget::Onion { host_port } => {
                debug!("Dialing onion service {}", host_port);
                ctx.run(dialer.dial(Network::Tcp4.as_str(), host_port)).await?
            }
            DialTarget::Net { network, addr } => {
                debug!("Dialing {} {} through the anonymizing network", network, addr);
                ctx.run(dialer.dial(network.as_str(), &addr.to_string()))
                    .await?
            }
        };

        let laddr = self.local_multiaddr().await;
        let conn = OnionConn::new(raw, self.as_transport(), laddr, raddr.clone());

        self.inner
            .upgrader
            .upgrade_outbound(ctx, self.as_transport(), Box::new(conn), peer)
            .await
    }

    async fn listen(&self, laddr: &Multiaddr) -> Result<Box<dyn Listener>> {
        let onion = onion_endpoint(laddr)
            .ok_or_else(|| OnionError::malformed(format!("{} is not an onion address", laddr)))?;
        if onion.port() == 0 {
            return Err(OnionError::malformed(format!(
                "onion service port 0 out of range in {}",
                laddr
            )));
        }
        let service_id = onion.service_id();

        let conf = ListenConf {
            remote_ports: vec![onion.port()],
        };
        let service = self
            .inner
            .client
            .listen(&Context::background(), &conf)
            .await
            .map_err(|e| OnionError::client_unavailable("create onion service", e))?;

        if !service.id.eq_ignore_ascii_case(service_id) {
            warn!(
                "Onion service id mismatch: requested {}, client published {}",
                service_id, service.id
            );
            if let Err(e) = service.local_listener.close() {
                debug!("Failed to close mismatched service listener: {}", e);
            }
            return Err(OnionError::IdentityMismatch {
                requested: service_id.to_string(),
                returned: service.id,
            });
        }

        *self.inner.laddr.write().await = Some(laddr.clone());
        info!("Listening on onion service {}", laddr);

        Ok(Box::new(OnionListener::new(
            laddr.clone(),
            service.local_listener,
            self.as_transport(),
            self.inner.upgrader.clone(),
        )))
    }
}

impl std::fmt::Debug for OnionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnionTransport")
            .field("dial_only_onion", &self.inner.dial_only_onion)
            .finish_non_exhaustive()
    }
}

/// Wrap a client failure with the operation that hit it
fn unavailable(op: &'static str, err: OnionError) -> OnionError {
    if err.is_cancellation() {
        err
    } else {
        OnionError::client_unavailable(op, err)
    }
}
