// Command channel tests
//
// The remote side is played by a hook on the mock discovery: whenever the
// channel broadcasts `open_connection`, the hook dials the advertised endpoint.

use anyhow::Result;
use remex_common::logging::{Component, Logger};
use remex_node::network::{read_message, write_message, Signal};
use remex_node::protocol::{CommandRequest, CommandResult, ExecMode, Message, MessageType};
use remex_node::{ChannelState, CommandChannel, MockNodeDiscovery, RemexError};
use remex_test_utils::{
    create_session_test_config, dial_and_serve, echo_evaluator, init_test_logging, Evaluator,
    RemoteStats,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

const LOCAL: &str = "local-node";
const REMOTE: &str = "remote-node";

fn logger() -> Logger {
    Logger::new_root(Component::Custom("Test"), LOCAL)
}

/// Discovery whose first `open_connection` makes `REMOTE` dial back
fn discovery_dialing_back(evaluator: Evaluator, stats: Arc<RemoteStats>) -> MockNodeDiscovery {
    let dialed = Arc::new(AtomicBool::new(false));
    MockNodeDiscovery::new(LOCAL).with_open_connection_hook(Arc::new(
        move |_remote: &str, endpoint: SocketAddr| {
            if !dialed.swap(true, Ordering::SeqCst) {
                dial_and_serve(
                    endpoint,
                    REMOTE.to_string(),
                    Arc::clone(&evaluator),
                    Arc::clone(&stats),
                );
            }
        },
    ))
}

#[tokio::test]
async fn test_open_and_run_two_commands() -> Result<()> {
    init_test_logging();
    let config = create_session_test_config()?;
    let stats = Arc::new(RemoteStats::default());
    let discovery = discovery_dialing_back(echo_evaluator(), Arc::clone(&stats));

    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());
    assert_eq!(channel.state(), ChannelState::Idle);

    channel.open(&discovery).await?;
    assert_eq!(channel.state(), ChannelState::Connected);
    assert_eq!(discovery.open_connection_count(), 1);
    assert!(channel.peer_addr().is_some());

    let first = channel
        .run_command("print('a')", true, ExecMode::ExecStatement)
        .await?;
    assert_eq!(first, CommandResult::success("print('a')").to_payload());

    let second = channel
        .run_command("1+1", false, ExecMode::EvalStatement)
        .await?;
    assert_eq!(second, CommandResult::success("1+1").to_payload());
    assert_eq!(stats.commands(), 2);

    channel.close(&discovery).await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(discovery.close_connection_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_open_connection_advertises_listen_address() -> Result<()> {
    let config = create_session_test_config()?;
    let discovery = discovery_dialing_back(echo_evaluator(), Arc::new(RemoteStats::default()));

    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());
    channel.open(&discovery).await?;

    let listen_addr = channel.listen_addr().expect("listener is bound");
    assert_eq!(listen_addr, config.command_endpoint);
    assert_eq!(
        discovery.signals()[0],
        Signal::OpenConnection {
            remote_node_id: REMOTE.to_string(),
            command_endpoint: listen_addr,
        }
    );

    channel.close(&discovery).await;
    Ok(())
}

#[tokio::test]
async fn test_remote_that_never_dials_exhausts_attempts() -> Result<()> {
    let config = create_session_test_config()?.with_accept_timeout(Duration::from_millis(100));
    let discovery = MockNodeDiscovery::new(LOCAL);

    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());
    let started = Instant::now();
    let result = channel.open(&discovery).await;
    let elapsed = started.elapsed();

    match result {
        Err(RemexError::RemoteDidNotConnect { attempts }) => assert_eq!(attempts, 6),
        other => panic!("expected RemoteDidNotConnect, got {other:?}"),
    }
    assert_eq!(discovery.open_connection_count(), 6);
    assert!(elapsed >= Duration::from_millis(550), "gave up after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "gave up after {elapsed:?}");
    assert_eq!(channel.state(), ChannelState::Listening);

    // A listening channel still tells the remote node to stand down
    channel.close(&discovery).await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(discovery.close_connection_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_late_dial_back_connects_on_a_later_attempt() -> Result<()> {
    let config = create_session_test_config()?.with_accept_timeout(Duration::from_millis(100));
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    let discovery = MockNodeDiscovery::new(LOCAL).with_open_connection_hook(Arc::new(
        move |_remote: &str, endpoint: SocketAddr| {
            // Only answer the third request
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                dial_and_serve(
                    endpoint,
                    REMOTE.to_string(),
                    echo_evaluator(),
                    Arc::new(RemoteStats::default()),
                );
            }
        },
    ));

    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());
    channel.open(&discovery).await?;
    assert_eq!(channel.state(), ChannelState::Connected);
    assert_eq!(discovery.open_connection_count(), 3);

    let result = channel.run_command("x", true, ExecMode::ExecFile).await?;
    assert!(CommandResult::payload_succeeded(&result));
    channel.close(&discovery).await;
    Ok(())
}

#[tokio::test]
async fn test_reply_of_wrong_type_is_invalid_response() -> Result<()> {
    let config = create_session_test_config()?;
    let discovery = MockNodeDiscovery::new(LOCAL).with_open_connection_hook(Arc::new(
        |_remote: &str, endpoint: SocketAddr| {
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(endpoint).await?;
                let request = read_message(&mut stream, 1024 * 1024, None).await?;
                let reply = Message::new(MessageType::Pong, REMOTE).with_dest(request.source);
                write_message(&mut stream, &reply).await?;
                // Hold the stream open until the channel hangs up
                let _ = read_message(&mut stream, 1024 * 1024, None).await;
                Ok::<(), RemexError>(())
            });
        },
    ));

    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());
    channel.open(&discovery).await?;
    let result = channel.run_command("1+1", true, ExecMode::EvalStatement).await;
    assert!(
        matches!(result, Err(RemexError::InvalidResponse(_))),
        "got {result:?}"
    );
    channel.close(&discovery).await;
    Ok(())
}

#[tokio::test]
async fn test_timed_out_command_cannot_leak_its_late_result() -> Result<()> {
    let config = create_session_test_config()?.with_command_timeout(Some(Duration::from_millis(200)));
    let discovery = MockNodeDiscovery::new(LOCAL).with_open_connection_hook(Arc::new(
        |_remote: &str, endpoint: SocketAddr| {
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(endpoint).await?;
                // Answer every command, but only after the caller gave up
                while let Ok(request) = read_message(&mut stream, 1024 * 1024, None).await {
                    let command = CommandRequest::from_payload(&request.data.unwrap_or_default())
                        .map(|r| r.command)
                        .unwrap_or_default();
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    let reply = Message::new(MessageType::CommandResult, REMOTE)
                        .with_dest(request.source)
                        .with_data(CommandResult::success(command).to_payload());
                    write_message(&mut stream, &reply).await?;
                }
                Ok::<(), RemexError>(())
            });
        },
    ));

    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());
    channel.open(&discovery).await?;

    let slow = channel.run_command("slow", true, ExecMode::ExecStatement).await;
    assert!(
        matches!(slow, Err(RemexError::CommandTimeout(_))),
        "got {slow:?}"
    );
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(channel.peer_addr().is_none());

    // Give the late result time to arrive; it must not become this call's answer
    tokio::time::sleep(Duration::from_millis(600)).await;
    let fast = channel.run_command("fast", true, ExecMode::ExecStatement).await;
    assert!(matches!(fast, Err(RemexError::NotConnected(_))), "got {fast:?}");

    // The remote node is still told to drop its side
    channel.close(&discovery).await;
    assert_eq!(discovery.close_connection_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_command_carries_request_fields() -> Result<()> {
    let config = create_session_test_config()?;
    let seen = Arc::new(std::sync::Mutex::new(None::<CommandRequest>));
    let recorder = Arc::clone(&seen);
    let evaluator: Evaluator = Arc::new(move |request: &CommandRequest| {
        *recorder.lock().unwrap() = Some(request.clone());
        CommandResult::success("ok").to_payload()
    });
    let discovery = discovery_dialing_back(evaluator, Arc::new(RemoteStats::default()));

    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());
    channel.open(&discovery).await?;
    channel
        .run_command("import os", false, ExecMode::ExecStatement)
        .await?;
    channel.close(&discovery).await;

    let request = seen.lock().unwrap().clone().expect("command reached the remote");
    assert_eq!(request.command, "import os");
    assert!(!request.unattended);
    assert_eq!(request.exec_mode, ExecMode::ExecStatement);
    Ok(())
}

#[tokio::test]
async fn test_run_command_before_open_is_not_connected() -> Result<()> {
    let config = create_session_test_config()?;
    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());

    let result = channel.run_command("1+1", true, ExecMode::ExecFile).await;
    assert!(matches!(result, Err(RemexError::NotConnected(_))));
    Ok(())
}

#[tokio::test]
async fn test_close_of_idle_channel_sends_nothing() -> Result<()> {
    let config = create_session_test_config()?;
    let discovery = MockNodeDiscovery::new(LOCAL);
    let mut channel = CommandChannel::new(LOCAL, REMOTE, &config, &logger());

    channel.close(&discovery).await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(discovery.signals().is_empty());

    let reopen = channel.open(&discovery).await;
    assert!(matches!(reopen, Err(RemexError::InvalidState(_))));
    Ok(())
}
