/// SOCKS5 client for the anonymizing client's SOCKS port
///
/// CONNECT by hostname (so `.onion` names are resolved inside the anonymizing
/// network) goes through `tokio-socks`. The RESOLVE extension used for proxied
/// name lookups is not offered there and is spoken directly.

use oniontransport_common::OnionError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

/// SOCKS5 protocol constants
const SOCKS_VERSION: u8 = 0x05;
const NO_AUTH_REQUIRED: u8 = 0x00;
/// Tor extension: resolve a hostname, reply carries the address
const RESOLVE_COMMAND: u8 = 0xF0;
const IPV4_ADDRESS: u8 = 0x01;
const DOMAIN_NAME: u8 = 0x03;
const IPV6_ADDRESS: u8 = 0x04;

const SUCCESS: u8 = 0x00;

/// Open a stream to `host:port` through the proxy
pub async fn connect(proxy: &str, host: &str, port: u16) -> Result<TcpStream, SocksError> {
    let stream = Socks5Stream::connect(proxy, (host, port)).await?;

    debug!("SOCKS5: connected to {}:{} via {}", host, port, proxy);
    Ok(stream.into_inner())
}

/// Resolve `host` through the proxy
///
/// The RESOLVE extension returns a single address per request.
pub async fn resolve(proxy: &str, host: &str) -> Result<Vec<IpAddr>, SocksError> {
    let mut stream = TcpStream::connect(proxy).await?;
    handshake(&mut stream).await?;

    match request(&mut stream, RESOLVE_COMMAND, host, 0).await? {
        BoundAddr::Ip(ip, _) => Ok(vec![ip]),
        BoundAddr::Domain(name, _) => Err(SocksError::NoAddress(name)),
    }
}

/// Address the proxy reports in its reply
#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundAddr {
    Ip(IpAddr, u16),
    Domain(String, u16),
}

async fn handshake<S>(stream: &mut S) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS_VERSION, 1, NO_AUTH_REQUIRED])
        .await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;

    if reply[0] != SOCKS_VERSION {
        return Err(SocksError::UnsupportedVersion(reply[0]));
    }
    if reply[1] != NO_AUTH_REQUIRED {
        return Err(SocksError::NoAcceptableAuth);
    }

    Ok(())
}

async fn request<S>(
    stream: &mut S,
    command: u8,
    host: &str,
    port: u16,
) -> Result<BoundAddr, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Request format: VER | CMD | RSV | ATYP | DST.ADDR | DST.PORT
    let mut msg = vec![SOCKS_VERSION, command, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            msg.push(IPV4_ADDRESS);
            msg.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            msg.push(IPV6_ADDRESS);
            msg.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len())
                .map_err(|_| SocksError::HostnameTooLong(host.len()))?;
            msg.push(DOMAIN_NAME);
            msg.push(len);
            msg.extend_from_slice(host.as_bytes());
        }
    }
    msg.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&msg).await?;

    // Reply format: VER | REP | RSV | ATYP | BND.ADDR | BND.PORT
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;

    if head[0] != SOCKS_VERSION {
        return Err(SocksError::UnsupportedVersion(head[0]));
    }
    if head[1] != SUCCESS {
        return Err(SocksError::Reply {
            code: head[1],
            message: reply_message(head[1]),
        });
    }

    read_bound_addr(stream, head[3]).await
}

async fn read_bound_addr<S>(stream: &mut S, address_type: u8) -> Result<BoundAddr, SocksError>
where
    S: AsyncRead + Unpin,
{
    let bound = match address_type {
        IPV4_ADDRESS => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            BoundAddr::Ip(IpAddr::V4(Ipv4Addr::from(addr)), read_port(stream).await?)
        }
        IPV6_ADDRESS => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            BoundAddr::Ip(IpAddr::V6(Ipv6Addr::from(addr)), read_port(stream).await?)
        }
        DOMAIN_NAME => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut domain = vec![0u8; len[0] as usize];
            stream.read_exact(&mut domain).await?;
            BoundAddr::Domain(
                String::from_utf8_lossy(&domain).into_owned(),
                read_port(stream).await?,
            )
        }
        other => return Err(SocksError::UnexpectedAddressType(other)),
    };

    Ok(bound)
}

async fn read_port<S>(stream: &mut S) -> Result<u16, SocksError>
where
    S: AsyncRead + Unpin,
{
    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    Ok(u16::from_be_bytes(port))
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}

/// SOCKS client errors
#[derive(Debug, thiserror::Error)]
pub enum SocksError {
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    #[error("No acceptable auth methods")]
    NoAcceptableAuth,

    #[error("Hostname too long: {0} bytes")]
    HostnameTooLong(usize),

    #[error("Proxy replied {code:#04x} ({message})")]
    Reply { code: u8, message: &'static str },

    #[error("Unexpected address type in reply: {0}")]
    UnexpectedAddressType(u8),

    #[error("Proxy returned a name instead of an address: {0}")]
    NoAddress(String),

    #[error("SOCKS proxy error: {0}")]
    Proxy(#[from] tokio_socks::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SocksError> for OnionError {
    fn from(err: SocksError) -> Self {
        match err {
            SocksError::Io(e) | SocksError::Proxy(tokio_socks::Error::Io(e)) => OnionError::Io(e),
            other => OnionError::Socks(other.to_string()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal SOCKS5 server: accepts one client, reads the handshake and a
    /// request, records the request and answers with `reply`.
    pub(crate) async fn fake_proxy(reply: Vec<u8>) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut greeting = [0u8; 3];
            socket.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [SOCKS_VERSION, 1, NO_AUTH_REQUIRED]);
            socket
                .write_all(&[SOCKS_VERSION, NO_AUTH_REQUIRED])
                .await
                .unwrap();

            let mut head = [0u8; 4];
            socket.read_exact(&mut head).await.unwrap();
            let mut request = head.to_vec();
            let addr_len = match head[3] {
                IPV4_ADDRESS => 4,
                IPV6_ADDRESS => 16,
                _ => {
                    let mut len = [0u8; 1];
                    socket.read_exact(&mut len).await.unwrap();
                    request.push(len[0]);
                    len[0] as usize
                }
            };
            let mut rest = vec![0u8; addr_len + 2];
            socket.read_exact(&mut rest).await.unwrap();
            request.extend_from_slice(&rest);

            socket.write_all(&reply).await.unwrap();

            // echo anything sent after the reply
            let mut buf = [0u8; 64];
            if let Ok(n) = socket.read(&mut buf).await {
                let _ = socket.write_all(&buf[..n]).await;
            }

            request
        });

        (addr, task)
    }

    #[tokio::test]
    async fn test_resolve_ipv4() {
        let reply = vec![SOCKS_VERSION, SUCCESS, 0, IPV4_ADDRESS, 93, 184, 216, 34, 0, 0];
        let (proxy, server) = fake_proxy(reply).await;

        let addrs = resolve(&proxy, "example.com").await.unwrap();
        assert_eq!(addrs, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);

        let request = server.await.unwrap();
        assert_eq!(request[1], RESOLVE_COMMAND);
        assert_eq!(request[3], DOMAIN_NAME);
        assert_eq!(request[4] as usize, "example.com".len());
        assert_eq!(&request[5..16], b"example.com");
    }

    #[tokio::test]
    async fn test_resolve_ipv6() {
        let mut reply = vec![SOCKS_VERSION, SUCCESS, 0, IPV6_ADDRESS];
        reply.extend_from_slice(&"2001:db8::1".parse::<Ipv6Addr>().unwrap().octets());
        reply.extend_from_slice(&[0, 0]);
        let (proxy, _server) = fake_proxy(reply).await;

        let addrs = resolve(&proxy, "example.com").await.unwrap();
        assert_eq!(addrs, vec!["2001:db8::1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_failure_reply() {
        let reply = vec![SOCKS_VERSION, 0x04, 0, IPV4_ADDRESS, 0, 0, 0, 0, 0, 0];
        let (proxy, _server) = fake_proxy(reply).await;

        let err = resolve(&proxy, "nx.invalid").await.unwrap_err();
        assert!(matches!(err, SocksError::Reply { code: 0x04, .. }));
        assert!(err.to_string().contains("host unreachable"));
    }

    #[tokio::test]
    async fn test_connect_by_hostname() {
        let reply = vec![SOCKS_VERSION, SUCCESS, 0, IPV4_ADDRESS, 0, 0, 0, 0, 0, 0];
        let (proxy, server) = fake_proxy(reply).await;

        let mut stream = connect(&proxy, "aaaaaaaaaaaaaaaa.onion", 80).await.unwrap();
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        let request = server.await.unwrap();
        assert_eq!(request[1], 0x01);
        assert_eq!(&request[5..27], b"aaaaaaaaaaaaaaaa.onion");
        assert_eq!(&request[27..29], &80u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_connect_refused_reply() {
        let reply = vec![SOCKS_VERSION, 0x05, 0, IPV4_ADDRESS, 0, 0, 0, 0, 0, 0];
        let (proxy, _server) = fake_proxy(reply).await;

        let err = connect(&proxy, "aaaaaaaaaaaaaaaa.onion", 80).await.unwrap_err();
        assert!(matches!(err, SocksError::Proxy(_)), "{err}");
        assert!(matches!(OnionError::from(err), OnionError::Socks(_)));
    }

    #[tokio::test]
    async fn test_hostname_too_long() {
        let reply = vec![SOCKS_VERSION, SUCCESS, 0, IPV4_ADDRESS, 0, 0, 0, 0, 0, 0];
        let (proxy, _server) = fake_proxy(reply).await;

        let long = "a".repeat(300);
        let err = resolve(&proxy, &long).await.unwrap_err();
        assert!(matches!(err, SocksError::HostnameTooLong(300)));
    }

    #[test]
    fn test_socks_error_into_onion_error() {
        let err: OnionError = SocksError::Reply {
            code: 0x05,
            message: reply_message(0x05),
        }
        .into();
        assert!(matches!(err, OnionError::Socks(_)));
    }
}
