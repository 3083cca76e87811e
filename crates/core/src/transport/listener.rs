use super::{Listener, OnionConn, SecuredConn, Transport, Upgrader};
use crate::client::RawListener;
use crate::context::Context;
use async_trait::async_trait;
use oniontransport_common::{socket_multiaddr, Multiaddr, MultiaddrExt, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Listener for a published onion service
///
/// Accepted connections carry the service address as their local address and
/// the forwarding peer's socket address as their remote address.
pub struct OnionListener {
    laddr: Multiaddr,
    listener: Box<dyn RawListener>,
    transport: Arc<dyn Transport>,
    upgrader: Arc<dyn Upgrader>,
}

impl OnionListener {
    pub(crate) fn new(
        laddr: Multiaddr,
        listener: Box<dyn RawListener>,
        transport: Arc<dyn Transport>,
        upgrader: Arc<dyn Upgrader>,
    ) -> Self {
        Self {
            laddr,
            listener,
            transport,
            upgrader,
        }
    }
}

#[async_trait]
impl Listener for OnionListener {
    async fn accept(&self) -> Result<Box<dyn SecuredConn>> {
        let (raw, peer) = self.listener.accept().await?;
        debug!("Inbound connection on {} from {}", self.laddr, peer);

        let conn = OnionConn::new(
            raw,
            self.transport.clone(),
            Some(self.laddr.clone()),
            socket_multiaddr(peer),
        );

        self.upgrader
            .upgrade_inbound(&Context::background(), self.transport.clone(), Box::new(conn))
            .await
    }

    fn close(&self) -> Result<()> {
        self.listener.close()
    }

    /// Socket address of the service, or of the local forwarding listener
    /// when the service address has none
    fn addr(&self) -> Option<SocketAddr> {
        self.laddr
            .to_socket_addr()
            .map(|(_, addr)| addr)
            .or_else(|| self.listener.local_addr().ok())
    }

    fn multiaddr(&self) -> &Multiaddr {
        &self.laddr
    }
}
