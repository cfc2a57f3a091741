// Configuration Module
//
// Connection parameters for a Remex session. A `SessionConfig` is handed to
// `Session::new` once and never changes afterwards.
//
// ## Examples
//
// ```rust
// use std::time::Duration;
// use remex_node::SessionConfig;
//
// let config = SessionConfig::default()
//     .with_multicast_group("239.0.0.1:6766".parse().unwrap())
//     .with_accept_timeout(Duration::from_secs(2));
// ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::error::{RemexError, Result};

/// Default multicast group used for discovery
pub const DEFAULT_MULTICAST_GROUP: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 0, 0, 1), 6766);

/// Default endpoint the command listener binds to
pub const DEFAULT_COMMAND_ENDPOINT: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 6776);

/// Default multicast TTL: packets never leave the host
pub const DEFAULT_MULTICAST_TTL: u32 = 0;

/// Connection parameters for a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Hops a discovery datagram may traverse
    pub multicast_ttl: u32,
    /// Group address and port shared by every node
    pub multicast_group: SocketAddr,
    /// Local address the discovery socket binds to (with the group's port)
    pub multicast_bind_address: IpAddr,
    /// Local interface used to join the group and send multicast traffic
    pub multicast_interface: Ipv4Addr,
    /// Endpoint this session listens on for the command connection
    pub command_endpoint: SocketAddr,
    /// How often a `ping` is broadcast
    pub ping_interval: Duration,
    /// A remote node is dropped after this long without a `pong`
    pub node_timeout: Duration,
    /// Upper bound of a single discovery receive; also bounds `close()`
    pub receive_timeout: Duration,
    /// Pause between discovery loop iterations
    pub loop_interval: Duration,
    /// Upper bound of a single `accept()` on the command listener
    pub accept_timeout: Duration,
    /// Number of `open_connection` broadcasts before giving up
    pub accept_attempts: u32,
    /// Upper bound on waiting for a command result; None waits forever
    pub command_timeout: Option<Duration>,
    /// Largest command result accepted on the command connection
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            multicast_ttl: DEFAULT_MULTICAST_TTL,
            multicast_group: SocketAddr::V4(DEFAULT_MULTICAST_GROUP),
            multicast_bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            multicast_interface: Ipv4Addr::UNSPECIFIED,
            command_endpoint: SocketAddr::V4(DEFAULT_COMMAND_ENDPOINT),
            ping_interval: Duration::from_secs(1),
            node_timeout: Duration::from_secs(5),
            receive_timeout: Duration::from_millis(100),
            loop_interval: Duration::from_millis(100),
            accept_timeout: Duration::from_secs(5),
            accept_attempts: 6,
            command_timeout: None,
            max_message_size: 1024 * 1024, // 1MB default
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    pub fn with_multicast_group(mut self, group: SocketAddr) -> Self {
        self.multicast_group = group;
        self
    }

    pub fn with_multicast_bind_address(mut self, address: IpAddr) -> Self {
        self.multicast_bind_address = address;
        self
    }

    pub fn with_multicast_interface(mut self, interface: Ipv4Addr) -> Self {
        self.multicast_interface = interface;
        self
    }

    pub fn with_command_endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.command_endpoint = endpoint;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_loop_interval(mut self, interval: Duration) -> Self {
        self.loop_interval = interval;
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn with_accept_attempts(mut self, attempts: u32) -> Self {
        self.accept_attempts = attempts;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Check the values a socket cannot work with
    pub fn validate(&self) -> Result<()> {
        match self.multicast_group.ip() {
            IpAddr::V4(ip) if ip.is_multicast() => {}
            IpAddr::V4(ip) => {
                return Err(RemexError::Config(format!(
                    "Not a valid multicast IPv4 address: {ip}"
                )))
            }
            IpAddr::V6(_) => {
                return Err(RemexError::Config(
                    "Multicast address must be IPv4".to_string(),
                ))
            }
        }
        if !self.multicast_bind_address.is_ipv4() {
            return Err(RemexError::Config(
                "Multicast bind address must be IPv4".to_string(),
            ));
        }
        if self.accept_attempts == 0 {
            return Err(RemexError::Config(
                "accept_attempts must be at least 1".to_string(),
            ));
        }
        if self.receive_timeout.is_zero() || self.accept_timeout.is_zero() {
            return Err(RemexError::Config(
                "receive and accept timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = SessionConfig::default();
        assert_eq!(config.multicast_group, "239.0.0.1:6766".parse().unwrap());
        assert_eq!(config.command_endpoint, "127.0.0.1:6776".parse().unwrap());
        assert_eq!(config.multicast_ttl, 0);
        assert_eq!(config.accept_attempts, 6);
        assert_eq!(config.node_timeout, Duration::from_secs(5));
        assert!(config.command_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unicast_group() {
        let config = SessionConfig::default().with_multicast_group("10.0.0.1:6766".parse().unwrap());
        assert!(matches!(config.validate(), Err(RemexError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let config = SessionConfig::default().with_accept_attempts(0);
        assert!(config.validate().is_err());
    }
}
