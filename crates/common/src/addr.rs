/// Socket-address view of structured multi-protocol addresses
///
/// `Multiaddr` and `Protocol` come from the `multiaddr` crate. The extension
/// trait adds what a transport needs on top: the thin-waist conversion to a
/// socket address and the plain TCP grammar.

pub use multiaddr::{Error as MultiaddrError, Multiaddr, Protocol};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Network name of a thin-waist address, as dialers expect it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp4,
    Tcp6,
    Udp4,
    Udp6,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Udp4 => "udp4",
            Network::Udp6 => "udp6",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait MultiaddrExt {
    /// Convert an `ip4|ip6` + `tcp|udp` address to a socket address
    fn to_socket_addr(&self) -> Option<(Network, SocketAddr)>;

    /// Matches the plain TCP grammar: an IP or DNS segment followed by `tcp`
    fn is_tcp(&self) -> bool;

    /// Number of protocol segments
    fn segment_count(&self) -> usize;
}

impl MultiaddrExt for Multiaddr {
    fn to_socket_addr(&self) -> Option<(Network, SocketAddr)> {
        let mut iter = self.iter();
        let ip = match iter.next()? {
            Protocol::Ip4(ip) => IpAddr::V4(ip),
            Protocol::Ip6(ip) => IpAddr::V6(ip),
            _ => return None,
        };
        let (network, port) = match (iter.next()?, ip.is_ipv4()) {
            (Protocol::Tcp(port), true) => (Network::Tcp4, port),
            (Protocol::Tcp(port), false) => (Network::Tcp6, port),
            (Protocol::Udp(port), true) => (Network::Udp4, port),
            (Protocol::Udp(port), false) => (Network::Udp6, port),
            _ => return None,
        };
        if iter.next().is_some() {
            return None;
        }

        Some((network, SocketAddr::new(ip, port)))
    }

    fn is_tcp(&self) -> bool {
        let mut iter = self.iter();
        match (iter.next(), iter.next(), iter.next()) {
            (Some(host), Some(Protocol::Tcp(_)), None) => {
                matches!(host, Protocol::Ip4(_) | Protocol::Ip6(_)) || is_dns(&host)
            }
            _ => false,
        }
    }

    fn segment_count(&self) -> usize {
        self.iter().count()
    }
}

pub fn is_dns(protocol: &Protocol<'_>) -> bool {
    matches!(
        protocol,
        Protocol::Dns(_) | Protocol::Dns4(_) | Protocol::Dns6(_)
    )
}

/// Build `/ip4|ip6/<ip>/tcp/<port>` from a stream socket address
pub fn socket_multiaddr(addr: SocketAddr) -> Multiaddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) => Protocol::Ip4(ip),
        IpAddr::V6(ip) => Protocol::Ip6(ip),
    };
    Multiaddr::empty().with(ip).with(Protocol::Tcp(addr.port()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_socket_addr_conversion() {
        let (network, sock) = addr("/ip4/127.0.0.1/tcp/4001").to_socket_addr().unwrap();
        assert_eq!(network, Network::Tcp4);
        assert_eq!(sock, "127.0.0.1:4001".parse().unwrap());

        let (network, sock) = addr("/ip6/::1/udp/53").to_socket_addr().unwrap();
        assert_eq!(network, Network::Udp6);
        assert_eq!(sock, "[::1]:53".parse().unwrap());

        let back = socket_multiaddr("10.0.0.2:9000".parse().unwrap());
        assert_eq!(back.to_string(), "/ip4/10.0.0.2/tcp/9000");
    }

    #[test]
    fn test_non_thin_waist_addresses_do_not_convert() {
        assert!(addr("/dns4/example.com/tcp/80").to_socket_addr().is_none());
        assert!(addr("/onion/aaaaaaaaaaaaaaaa:80").to_socket_addr().is_none());
        assert!(addr("/ip4/1.2.3.4").to_socket_addr().is_none());
        assert!(addr("/ip4/1.2.3.4/tcp/1/tcp/2").to_socket_addr().is_none());
    }

    #[test]
    fn test_tcp_grammar() {
        assert!(addr("/ip4/1.2.3.4/tcp/4001").is_tcp());
        assert!(addr("/ip6/::1/tcp/4001").is_tcp());
        assert!(addr("/dns/example.com/tcp/443").is_tcp());
        assert!(addr("/dns6/example.com/tcp/443").is_tcp());
        assert!(!addr("/ip4/1.2.3.4/udp/4001").is_tcp());
        assert!(!addr("/ip4/1.2.3.4").is_tcp());
        assert!(!addr("/ip4/1.2.3.4/tcp/1/ws").is_tcp());
        assert!(!addr("/onion/aaaaaaaaaaaaaaaa:80").is_tcp());
    }

    #[test]
    fn test_segment_count() {
        assert_eq!(addr("/onion/aaaaaaaaaaaaaaaa:80").segment_count(), 1);
        assert_eq!(addr("/ip4/1.2.3.4/tcp/80").segment_count(), 2);
        assert_eq!(Multiaddr::empty().segment_count(), 0);
    }
}
