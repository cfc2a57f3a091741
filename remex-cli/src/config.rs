//! Configuration file support for the Remex CLI
//!
//! The file is JSON. Every field is optional; missing fields keep the
//! session defaults. Durations are given in milliseconds.

use anyhow::{Context, Result};
use remex_node::SessionConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Session settings as stored in a config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemexConfig {
    pub multicast_ttl: Option<u32>,
    pub multicast_group: Option<SocketAddr>,
    pub multicast_bind_address: Option<IpAddr>,
    pub multicast_interface: Option<Ipv4Addr>,
    pub command_endpoint: Option<SocketAddr>,
    pub ping_interval_ms: Option<u64>,
    pub node_timeout_ms: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
    pub loop_interval_ms: Option<u64>,
    pub accept_timeout_ms: Option<u64>,
    pub accept_attempts: Option<u32>,
    /// Absent means wait forever for a command result
    pub command_timeout_ms: Option<u64>,
    pub max_message_size: Option<usize>,
}

impl RemexConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        Self::from_json(&content).with_context(|| format!("Invalid config file: {path:?}"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse configuration")
    }

    /// Apply the configured values on top of the session defaults
    pub fn into_session_config(self) -> Result<SessionConfig> {
        let mut config = SessionConfig::default();
        if let Some(ttl) = self.multicast_ttl {
            config = config.with_multicast_ttl(ttl);
        }
        if let Some(group) = self.multicast_group {
            config = config.with_multicast_group(group);
        }
        if let Some(address) = self.multicast_bind_address {
            config = config.with_multicast_bind_address(address);
        }
        if let Some(interface) = self.multicast_interface {
            config = config.with_multicast_interface(interface);
        }
        if let Some(endpoint) = self.command_endpoint {
            config = config.with_command_endpoint(endpoint);
        }
        if let Some(ms) = self.ping_interval_ms {
            config = config.with_ping_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.node_timeout_ms {
            config = config.with_node_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.receive_timeout_ms {
            config = config.with_receive_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.loop_interval_ms {
            config = config.with_loop_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.accept_timeout_ms {
            config = config.with_accept_timeout(Duration::from_millis(ms));
        }
        if let Some(attempts) = self.accept_attempts {
            config = config.with_accept_attempts(attempts);
        }
        if let Some(ms) = self.command_timeout_ms {
            config = config.with_command_timeout(Some(Duration::from_millis(ms)));
        }
        if let Some(size) = self.max_message_size {
            config = config.with_max_message_size(size);
        }

        config.validate().context("Invalid session configuration")?;
        Ok(config)
    }
}

/// Session config from an optional file, defaults otherwise
pub fn load_session_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => RemexConfig::load(path)?.into_session_config(),
        None => RemexConfig::default().into_session_config(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = RemexConfig::from_json("{}")
            .unwrap()
            .into_session_config()
            .unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(RemexConfig::from_json(r#"{"ping_interval": 5}"#).is_err());
    }
}
