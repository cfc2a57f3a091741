// Logging utilities for the Remex system
//
// This module provides a small structured logging layer over the `log` facade:
// - Component-based prefixes (`[node_id][Discovery] ...`)
// - Node ID tracking through logger inheritance
// - Optional peer tagging for per-connection traces

use log::{debug, error, info, warn, LevelFilter};
use std::fmt::{self, Arguments, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Session,
    Discovery,
    Registry,
    Command,
    Remote,
    CLI,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Session => "Session",
            Component::Discovery => "Discovery",
            Component::Registry => "Registry",
            Component::Command => "Command",
            Component::Remote => "Remote",
            Component::CLI => "CLI",
            Component::Custom(name) => name,
        }
    }
}

// Display helper to avoid allocating the prefix on every record
struct PrefixDisplay<'a> {
    parent: Option<Component>,
    component: Component,
    peer: Option<&'a str>,
}

impl Display for PrefixDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::Session => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())?
            }
            _ => write!(f, "{}", self.component.as_str())?,
        }
        if let Some(peer) = self.peer {
            write!(f, "|peer={peer}")?;
        }
        Ok(())
    }
}

/// A helper for creating component-specific loggers with node ID tracking
#[derive(Clone, Debug)]
pub struct Logger {
    /// Component this logger is for
    component: Component,
    /// Node ID of the local session
    node_id: String,
    /// Parent component for hierarchical logging (if any)
    parent_component: Option<Component>,
    /// Remote node this logger is talking to (if any)
    peer: Option<String>,
}

impl Logger {
    /// Create a new root logger for a specific component and node ID
    pub fn new_root(component: Component, node_id: &str) -> Self {
        Self {
            component,
            node_id: node_id.to_string(),
            parent_component: None,
            peer: None,
        }
    }

    /// Create a child logger with the same node ID but different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            node_id: self.node_id.clone(),
            parent_component: Some(self.component),
            peer: self.peer.clone(),
        }
    }

    /// Create a logger tagged with the remote node it is talking to
    pub fn with_peer(&self, peer: impl Into<String>) -> Self {
        Self {
            component: self.component,
            node_id: self.node_id.clone(),
            parent_component: self.parent_component,
            peer: Some(peer.into()),
        }
    }

    /// Get a reference to the node ID
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get the component this logger writes for
    pub fn component(&self) -> Component {
        self.component
    }

    /// Get the peer tag if available
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    fn prefix(&self) -> PrefixDisplay<'_> {
        PrefixDisplay {
            parent: self.parent_component,
            component: self.component,
            peer: self.peer(),
        }
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.node_id, self.prefix(), message.into());
        }
    }

    /// Log a debug message using fmt::Arguments (avoids allocating message String)
    pub fn debug_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.node_id, self.prefix(), args);
        }
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.node_id, self.prefix(), message.into());
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.node_id, self.prefix(), message.into());
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.node_id, self.prefix(), message.into());
        }
    }
}

/// Install `env_logger` as the `log` backend.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies. Returns false
/// when a logger was already installed, which is expected in test binaries.
pub fn init_env_logger(default_level: LevelFilter) -> bool {
    let env = env_logger::Env::default().default_filter_or(default_level.as_str());
    env_logger::Builder::from_env(env).try_init().is_ok()
}
