pub mod addr;
pub mod config;
pub mod error;

pub use config::{defaults, ConfigError, TransportConfig};
pub use error::{ContextError, OnionError, Result};
pub use addr::{
    is_dns, socket_multiaddr, Multiaddr, MultiaddrError, MultiaddrExt, Network, Protocol,
};

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

pub const PEER_ID_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid peer id length: expected {expected}, got {actual}")]
    InvalidPeerId { expected: usize, actual: usize },
    #[error("invalid peer id hex: {0}")]
    InvalidPeerIdHex(String),
}

/// Identity of the remote peer, handed opaquely to the upgrade step.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId([u8; PEER_ID_LEN]);

impl PeerId {
    pub fn from_bytes(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> std::result::Result<Self, DomainError> {
        if bytes.len() != PEER_ID_LEN {
            return Err(DomainError::InvalidPeerId {
                expected: PEER_ID_LEN,
                actual: bytes.len(),
            });
        }

        let mut array = [0u8; PEER_ID_LEN];
        array.copy_from_slice(bytes);
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, DomainError> {
        let decoded =
            hex::decode(hex_str).map_err(|err| DomainError::InvalidPeerIdHex(err.to_string()))?;
        Self::from_slice(&decoded)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(self.0))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; PEER_ID_LEN]> for PeerId {
    fn from(value: [u8; PEER_ID_LEN]) -> Self {
        Self::from_bytes(value)
    }
}

impl TryFrom<&[u8]> for PeerId {
    type Error = DomainError;

    fn try_from(value: &[u8]) -> std::result::Result<Self, Self::Error> {
        Self::from_slice(value)
    }
}

impl FromStr for PeerId {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
