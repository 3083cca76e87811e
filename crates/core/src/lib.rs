pub mod address;
pub mod client;
pub mod context;
pub mod resolver;
pub mod socks;
pub mod transport;

pub use address::{
    is_valid_onion_multiaddr, is_valid_onion_str, onion_endpoint, parse_onion_multiaddr,
    OnionAddr, ONION_TAGS,
};
pub use client::{
    BoxedStream, DialConf, Dialer, ListenConf, LocalListener, OnionClient, OnionService,
    RawListener, RawStream, SocksClient, SocksDialer,
};
pub use context::Context;

// Re-export resolver types
pub use resolver::{
    Backend, IpAddrRecord, OnionBackend, ProxyLookup, Resolver, SocksLookup,
};

// Re-export transport types
pub use transport::{
    Listener, OnionConn, OnionListener, OnionTransport, SecuredConn, Transport, TransportConn,
    TransportConstructor, TransportSet, Upgrader,
};

pub use socks::SocksError;
