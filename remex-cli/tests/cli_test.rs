//! Basic tests for the Remex CLI

use clap::Parser;
use remex_cli::{load_session_config, Cli, Commands, RemexConfig};
use remex_node::{ExecMode, SessionConfig};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_run_arguments() {
    let cli = Cli::try_parse_from([
        "remex",
        "--verbose",
        "--config",
        "remex.json",
        "run",
        "--node",
        "B",
        "--mode",
        "eval_statement",
        "--interactive",
        "--raise-on-failure",
        "--wait-ms",
        "500",
        "1+1",
    ])
    .expect("arguments parse");

    assert!(cli.verbose);
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("remex.json")));
    match cli.command {
        Commands::Run {
            node,
            mode,
            interactive,
            raise_on_failure,
            wait_ms,
            command,
        } => {
            assert_eq!(node.as_deref(), Some("B"));
            assert_eq!(mode, ExecMode::EvalStatement);
            assert!(interactive);
            assert!(raise_on_failure);
            assert_eq!(wait_ms, 500);
            assert_eq!(command, "1+1");
        }
        _ => panic!("expected the run subcommand"),
    }
}

#[test]
fn test_discover_arguments() {
    let cli = Cli::try_parse_from(["remex", "discover", "--wait-ms", "100"]).expect("parse");
    assert!(matches!(cli.command, Commands::Discover { wait_ms: 100 }));
}

#[test]
fn test_unknown_mode_is_rejected() {
    assert!(Cli::try_parse_from(["remex", "run", "--mode", "exec_everything", "x"]).is_err());
    assert!(Cli::try_parse_from(["remex", "run"]).is_err());
}

#[test]
fn test_config_file_overrides_defaults() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    write!(
        file,
        r#"{{
            "multicast_group": "239.1.2.3:7000",
            "command_endpoint": "127.0.0.1:7001",
            "multicast_ttl": 1,
            "ping_interval_ms": 250,
            "accept_attempts": 2,
            "command_timeout_ms": 30000
        }}"#
    )
    .expect("Failed to write config");

    let config = load_session_config(Some(file.path())).expect("config loads");
    assert_eq!(config.multicast_group, "239.1.2.3:7000".parse().unwrap());
    assert_eq!(config.command_endpoint, "127.0.0.1:7001".parse().unwrap());
    assert_eq!(config.multicast_ttl, 1);
    assert_eq!(config.ping_interval, Duration::from_millis(250));
    assert_eq!(config.accept_attempts, 2);
    assert_eq!(config.command_timeout, Some(Duration::from_secs(30)));
    // Untouched fields keep their defaults
    assert_eq!(config.node_timeout, SessionConfig::default().node_timeout);
}

#[test]
fn test_invalid_config_values_are_rejected() {
    let unicast = RemexConfig {
        multicast_group: Some("10.0.0.1:6766".parse().unwrap()),
        ..RemexConfig::default()
    };
    assert!(unicast.into_session_config().is_err());

    let no_attempts = RemexConfig {
        accept_attempts: Some(0),
        ..RemexConfig::default()
    };
    assert!(no_attempts.into_session_config().is_err());
}

#[test]
fn test_missing_config_file() {
    let result = load_session_config(Some(std::path::Path::new("/nonexistent/remex.json")));
    assert!(result.is_err());
    assert_eq!(load_session_config(None).unwrap(), SessionConfig::default());
}
