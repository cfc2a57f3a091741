//! Remex Common
//!
//! Common utilities for the Remex remote execution stack.
//!
//! This crate provides:
//! - Component-based structured logging with node ID context
//! - Session node ID generation

// Export modules
pub mod logging;
// Re-export types at the root level
pub use logging::{init_env_logger, Component, Logger};

/// Utility module for session node identifiers
pub mod node_ids {
    use uuid::Uuid;

    /// Generate a fresh node ID for a session.
    /// - Random (UUID v4), stable for the lifetime of the session that owns it
    /// - Hyphenated lowercase form, as carried in the `source` field
    pub fn generate_node_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[cfg(test)]
    mod tests {
        use super::generate_node_id;

        #[test]
        fn node_ids_are_unique_and_hyphenated() {
            let a = generate_node_id();
            let b = generate_node_id();
            assert_ne!(a, b);
            assert_eq!(a.len(), 36);
            assert_eq!(a.matches('-').count(), 4);
        }
    }
}
