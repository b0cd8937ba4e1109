//! Live connection registry.
//!
//! Sessions themselves are owned by their connection task; the registry only
//! tracks which connections are live so they can be counted and inspected.
//! Registration returns a [`SessionGuard`] that deregisters on drop, so a
//! connection task that ends for any reason (close, error, cancellation)
//! leaves nothing behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::ConnectionId;

/// Registry entry for one live connection.
#[derive(Debug, Clone)]
struct Entry {
    connected_at: DateTime<Utc>,
    turns: Arc<AtomicU64>,
}

/// Snapshot of the registry for the sessions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub active_sessions: usize,
    pub total_sessions: u64,
    pub oldest_connected_at: Option<DateTime<Utc>>,
}

/// Connection-id → live connection map, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    connections: Arc<DashMap<ConnectionId, Entry>>,
    total_created: Arc<AtomicU64>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    #[must_use]
    pub fn register(&self) -> SessionGuard {
        let id = ConnectionId::new();
        let turns = Arc::new(AtomicU64::new(0));
        self.connections.insert(
            id,
            Entry {
                connected_at: Utc::now(),
                turns: Arc::clone(&turns),
            },
        );
        self.total_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection_id = %id, "Session registered");

        SessionGuard {
            id,
            turns,
            connections: Arc::clone(&self.connections),
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn active(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Turns handled so far by a live connection.
    #[must_use]
    pub fn turns(&self, id: ConnectionId) -> Option<u64> {
        self.connections
            .get(&id)
            .map(|entry| entry.turns.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_sessions: self.connections.len(),
            total_sessions: self.total_created.load(Ordering::Relaxed),
            oldest_connected_at: self
                .connections
                .iter()
                .map(|entry| entry.connected_at)
                .min(),
        }
    }
}

/// Registration handle held by a connection task.
#[derive(Debug)]
pub struct SessionGuard {
    id: ConnectionId,
    turns: Arc<AtomicU64>,
    connections: Arc<DashMap<ConnectionId, Entry>>,
}

impl SessionGuard {
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Count one handled turn.
    pub fn record_turn(&self) {
        self.turns.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.connections.remove(&self.id);
        tracing::debug!(connection_id = %self.id, "Session removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_deregisters_on_drop() {
        let registry = SessionRegistry::new();
        let first = registry.register();
        let second = registry.register();
        assert_eq!(registry.active(), 2);
        assert_ne!(first.id(), second.id());

        let id = first.id();
        drop(first);
        assert!(!registry.contains(id));
        assert_eq!(registry.active(), 1);

        let stats = registry.stats();
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.total_sessions, 2);
    }

    #[test]
    fn test_turn_counter() {
        let registry = SessionRegistry::new();
        let guard = registry.register();
        guard.record_turn();
        guard.record_turn();
        assert_eq!(registry.turns(guard.id()), Some(2));
    }
}
