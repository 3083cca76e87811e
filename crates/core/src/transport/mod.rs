/// Transport contract and the onion transport implementing it
///
/// The host stack keeps a set of transports and hands an address to the
/// first one whose `can_dial` accepts it:
/// - `OnionTransport` dials onion services (and, unless restricted, plain
///   TCP addresses) through the anonymizing client
/// - `OnionListener` accepts connections for a published onion service
/// - `OnionConn` carries a raw stream plus its addresses into the upgrade step

mod connection;
mod listener;
mod onion;

#[cfg(test)]
pub(crate) mod fakes;

pub use connection::OnionConn;
pub use listener::OnionListener;
pub use onion::{OnionTransport, TransportConstructor};

use crate::client::RawStream;
use crate::context::Context;
use async_trait::async_trait;
use oniontransport_common::{Multiaddr, OnionError, PeerId, Result};
use std::net::SocketAddr;
use std::sync::Arc;

/// Capability-dispatched transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether this transport knows how to dial `addr`. A `true` answer does
    /// not promise the dial will succeed.
    fn can_dial(&self, addr: &Multiaddr) -> bool;

    /// Tags of the terminal protocols this transport handles
    fn protocols(&self) -> Vec<&'static str>;

    fn proxy(&self) -> bool;

    async fn dial(
        &self,
        ctx: &Context,
        raddr: &Multiaddr,
        peer: PeerId,
    ) -> Result<Box<dyn SecuredConn>>;

    async fn listen(&self, laddr: &Multiaddr) -> Result<Box<dyn Listener>>;
}

/// Accepts upgraded inbound connections
#[async_trait]
pub trait Listener: Send + Sync {
    async fn accept(&self) -> Result<Box<dyn SecuredConn>>;

    fn close(&self) -> Result<()>;

    fn addr(&self) -> Option<SocketAddr>;

    fn multiaddr(&self) -> &Multiaddr;
}

/// Raw connection plus the metadata the upgrade step needs
pub trait TransportConn: RawStream {
    fn transport(&self) -> Arc<dyn Transport>;

    fn local_multiaddr(&self) -> Option<&Multiaddr>;

    fn remote_multiaddr(&self) -> &Multiaddr;
}

/// Secured, multiplexed connection produced by the upgrade step
pub trait SecuredConn: Send {
    fn transport(&self) -> Arc<dyn Transport>;

    fn local_multiaddr(&self) -> Option<Multiaddr>;

    fn remote_multiaddr(&self) -> Multiaddr;

    fn remote_peer(&self) -> Option<PeerId>;
}

/// Security and multiplexing negotiation, owned by the host stack
#[async_trait]
pub trait Upgrader: Send + Sync {
    async fn upgrade_outbound(
        &self,
        ctx: &Context,
        transport: Arc<dyn Transport>,
        conn: Box<dyn TransportConn>,
        peer: PeerId,
    ) -> Result<Box<dyn SecuredConn>>;

    async fn upgrade_inbound(
        &self,
        ctx: &Context,
        transport: Arc<dyn Transport>,
        conn: Box<dyn TransportConn>,
    ) -> Result<Box<dyn SecuredConn>>;
}

/// Transports tried in registration order
#[derive(Clone, Default)]
pub struct TransportSet {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transport: Arc<dyn Transport>) {
        self.transports.push(transport);
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// First transport claiming `addr`
    pub fn transport_for_dial(&self, addr: &Multiaddr) -> Option<Arc<dyn Transport>> {
        self.transports.iter().find(|t| t.can_dial(addr)).cloned()
    }

    pub async fn dial(
        &self,
        ctx: &Context,
        raddr: &Multiaddr,
        peer: PeerId,
    ) -> Result<Box<dyn SecuredConn>> {
        let transport = self.transport_for_dial(raddr).ok_or_else(|| {
            OnionError::Unsupported(format!("no transport can dial {}", raddr))
        })?;
        transport.dial(ctx, raddr, peer).await
    }
}
