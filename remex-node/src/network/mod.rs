// Network Module
//
// This module provides the UDP discovery channel and the TCP command channel.

pub mod command;
pub mod discovery;

pub use command::{read_message, write_message, ChannelState, CommandChannel};
pub use discovery::{
    create_multicast_socket, MockNodeDiscovery, MulticastDiscovery, NodeDiscovery, NodeRegistry,
    RemoteNode, Signal,
};
