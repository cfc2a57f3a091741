// Test utilities for Remex crates
//
// This crate provides test-specific functionality that should not be available
// in production builds: a scriptable remote interpreter speaking the peer side
// of the protocol, and helpers that give every test its own ports.

use anyhow::{anyhow, Result};
use log::LevelFilter;
use remex_node::SessionConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::ops::Range;
use std::time::Duration;

pub mod remote_interpreter;

pub use remote_interpreter::{
    dial_and_serve, echo_evaluator, serve_command_connection, Evaluator, MockRemoteInterpreter,
    RemoteInterpreterOptions, RemoteStats,
};

/// Multicast group address used by tests; the port is randomized per test
pub const TEST_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 98);

/// Route `log` output through env_logger; safe to call from every test
pub fn init_test_logging() {
    remex_common::init_env_logger(LevelFilter::Warn);
}

/// Find a free TCP port in the given range using a randomized approach
pub fn pick_free_port(port_range: Range<u16>) -> Option<u16> {
    use rand::Rng;
    if port_range.is_empty() {
        return None;
    }
    let mut rng = rand::rng();
    let range_size = port_range.end - port_range.start;

    // Limit number of attempts to avoid infinite loops
    for _ in 0..50 {
        let port = port_range.start + rng.random_range(0..range_size);
        if let Ok(listener) = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)) {
            if let Ok(addr) = listener.local_addr() {
                return Some(addr.port());
            }
        }
    }

    None // No free port found after max attempts
}

/// A multicast group with a port no other concurrently running test picked
pub fn unique_multicast_group() -> SocketAddr {
    let unique_port: u16 = 47000 + (rand::random::<u16>() % 1000);
    SocketAddr::new(IpAddr::V4(TEST_MULTICAST_ADDR), unique_port)
}

/// Session config with its own multicast group, a free command port and
/// timings shortened so tests finish quickly.
///
/// ⚠️  WARNING: This is for TESTING ONLY.
pub fn create_session_test_config() -> Result<SessionConfig> {
    let command_port = pick_free_port(50000..51000)
        .ok_or_else(|| anyhow!("No free command port in 50000..51000"))?;

    Ok(SessionConfig::default()
        .with_multicast_group(unique_multicast_group())
        .with_command_endpoint(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), command_port))
        .with_ping_interval(Duration::from_millis(100))
        .with_node_timeout(Duration::from_millis(1000))
        .with_receive_timeout(Duration::from_millis(20))
        .with_loop_interval(Duration::from_millis(20))
        .with_accept_timeout(Duration::from_millis(500))
        .with_command_timeout(Some(Duration::from_secs(5))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid_and_uses_test_ranges() {
        let config = create_session_test_config().unwrap();
        assert!(config.validate().is_ok());
        assert!(config.multicast_group.ip().is_multicast());
        assert!((50000..51000).contains(&config.command_endpoint.port()));
    }

    #[test]
    fn test_pick_free_port_with_empty_range() {
        assert_eq!(pick_free_port(50000..50000), None);
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = 50010..50000;
        assert_eq!(pick_free_port(reversed), None);
    }
}
