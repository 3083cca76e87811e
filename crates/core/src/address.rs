/// Onion service multiaddr codec
///
/// An onion multiaddr is a single segment `/onion/<service-id>:<port>`. The
/// service id is 16 base32 characters, without the ".onion" suffix, and the
/// port lies in 1..=65535. The `multiaddr` parser already rejects malformed
/// ids (wrong length, characters outside the base32 alphabet, non-zero
/// trailing bits), so a string that fails to parse is never a valid onion
/// address.
///
/// Dial and listen also accept `onion3` segments when extracting the service
/// endpoint, trying them before `onion` ones.

use data_encoding::BASE32;
use oniontransport_common::{Multiaddr, MultiaddrExt, OnionError, Protocol, Result};
use std::fmt;

/// Onion protocol tags in the order they are tried, newest first
pub const ONION_TAGS: [&str; 2] = ["onion3", "onion"];

/// A decomposed onion service address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OnionAddr {
    service_id: String,
    port: u16,
}

impl OnionAddr {
    /// Endpoint carried by an `onion` or `onion3` segment
    pub fn from_protocol(protocol: &Protocol<'_>) -> Option<Self> {
        let (hash, port) = match protocol {
            Protocol::Onion(hash, port) => {
                let hash: &[u8; 10] = hash;
                (BASE32.encode(hash), *port)
            }
            Protocol::Onion3(addr) => (BASE32.encode(addr.hash()), addr.port()),
            _ => return None,
        };

        Some(Self {
            service_id: hash.to_lowercase(),
            port,
        })
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host and port to hand to the anonymizing dialer
    pub fn dial_target(&self) -> String {
        format!("{}.onion:{}", self.service_id, self.port)
    }
}

impl fmt::Display for OnionAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service_id, self.port)
    }
}

fn onion_tag(protocol: &Protocol<'_>) -> Option<&'static str> {
    match protocol {
        Protocol::Onion3(_) => Some("onion3"),
        Protocol::Onion(..) => Some("onion"),
        _ => None,
    }
}

/// Endpoint of the first onion segment, trying newer tags first
pub fn onion_endpoint(addr: &Multiaddr) -> Option<OnionAddr> {
    ONION_TAGS.iter().find_map(|tag| {
        addr.iter()
            .find(|p| onion_tag(p) == Some(*tag))
            .and_then(|p| OnionAddr::from_protocol(&p))
    })
}

/// Decompose a single-segment `/onion` multiaddr, checking every field
pub fn parse_onion_multiaddr(addr: &Multiaddr) -> Result<OnionAddr> {
    let count = addr.segment_count();
    if count != 1 {
        return Err(OnionError::malformed(format!(
            "expected exactly one protocol in {}, got {}",
            addr, count
        )));
    }

    let onion = match addr.iter().next() {
        Some(ref protocol @ Protocol::Onion(..)) => OnionAddr::from_protocol(protocol),
        _ => None,
    }
    .ok_or_else(|| OnionError::malformed(format!("{} is not an onion address", addr)))?;

    if onion.port == 0 {
        return Err(OnionError::malformed(format!("onion port 0 out of range in {}", addr)));
    }

    Ok(onion)
}

/// True iff `addr` is a well-formed onion service multiaddr
pub fn is_valid_onion_multiaddr(addr: &Multiaddr) -> bool {
    parse_onion_multiaddr(addr).is_ok()
}

/// Parse `addr` and validate it as an onion service multiaddr
pub fn is_valid_onion_str(addr: &str) -> bool {
    addr.parse::<Multiaddr>()
        .map(|a| is_valid_onion_multiaddr(&a))
        .unwrap_or(false)
}
