use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default values for the onion transport
pub mod defaults {
    /// SOCKS port of a locally running anonymizing client
    pub const SOCKS_ADDR: &str = "127.0.0.1:9050";

    /// Upper bound for a proxied name lookup
    pub const LOOKUP_TIMEOUT_SECS: u64 = 30;

    /// Length of a version 2 onion service id, without ".onion"
    pub const ONION_SERVICE_ID_LEN: usize = 16;

    /// Default config file name used by `onionctl config`
    pub const CONFIG_FILE: &str = "onion-transport.toml";
}

/// Onion transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// SOCKS address used for dialing and name lookups
    pub socks_addr: String,

    /// Only dial onion addresses, refuse plain TCP ones
    pub dial_only_onion: bool,

    /// Timeout applied to proxied name lookups
    pub lookup_timeout_secs: u64,

    /// Onion multiaddrs to publish services on
    pub listen_addrs: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socks_addr: defaults::SOCKS_ADDR.to_string(),
            dial_only_onion: false,
            lookup_timeout_secs: defaults::LOOKUP_TIMEOUT_SECS,
            listen_addrs: Vec::new(),
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_socks_addr(mut self, addr: impl Into<String>) -> Self {
        self.socks_addr = addr.into();
        self
    }

    pub fn with_dial_only_onion(mut self, only_onion: bool) -> Self {
        self.dial_only_onion = only_onion;
        self
    }

    pub fn with_listen_addrs(mut self, addrs: Vec<String>) -> Self {
        self.listen_addrs = addrs;
        self
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.socks_addr, defaults::SOCKS_ADDR);
        assert!(!config.dial_only_onion);
        assert_eq!(config.lookup_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_builder() {
        let config = TransportConfig::new()
            .with_socks_addr("127.0.0.1:9150")
            .with_dial_only_onion(true)
            .with_listen_addrs(vec!["/onion/aaaaaaaaaaaaaaaa:80".to_string()]);

        assert_eq!(config.socks_addr, "127.0.0.1:9150");
        assert!(config.dial_only_onion);
        assert_eq!(config.listen_addrs.len(), 1);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TransportConfig = toml::from_str("dial_only_onion = true").unwrap();
        assert!(config.dial_only_onion);
        assert_eq!(config.socks_addr, defaults::SOCKS_ADDR);
    }

    #[test]
    fn test_config_file_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "onion-transport-config-{}.toml",
            std::process::id()
        ));
        let config = TransportConfig::new().with_dial_only_onion(true);

        config.to_file(&path).unwrap();
        let loaded = TransportConfig::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let path = PathBuf::from("/nonexistent/onion-transport.toml");
        assert!(matches!(
            TransportConfig::from_file(&path),
            Err(ConfigError::ReadError(_))
        ));
    }
}
