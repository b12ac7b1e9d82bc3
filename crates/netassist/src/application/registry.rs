//! ConnectionRegistry: the set of live connections of one session.
//!
//! Written to by the accept loop (add), by inbound pumps (remove on read
//! failure) and by the controller (close all), and read by the outbound
//! dispatcher (snapshot) – all concurrently.  A single `RwLock` serialises
//! structural changes; [`ConnectionRegistry::snapshot`] copies the `Arc`s
//! out and releases the lock so a slow send never blocks a writer.
//!
//! # Identity
//!
//! Entries are keyed by [`ConnectionId`].  For client kinds and the UDP
//! server this is equivalent to local-address identity (one entry per local
//! socket); accepted TCP connections all share the listener's local address,
//! and the id is what keeps one peer's disconnect from evicting the others.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::infrastructure::network::{Connection, ConnectionId};

/// Ordered, duplicate-free collection of open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection.  Returns `false` if it was already present.
    pub async fn add(&self, conn: Arc<Connection>) -> bool {
        let mut guard = self.connections.write().await;
        if guard.iter().any(|c| c.id() == conn.id()) {
            return false;
        }
        debug!(
            "registered connection {} (local {}, peer {})",
            conn.id(),
            conn.local_addr(),
            conn.peer_label()
        );
        guard.push(conn);
        true
    }

    /// Removes the entry with `id`.  No-op (returns `None`) if absent.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut guard = self.connections.write().await;
        let index = guard.iter().position(|c| c.id() == id)?;
        let removed = guard.remove(index);
        debug!("removed connection {id}; {} remaining", guard.len());
        Some(removed)
    }

    /// Returns a stable copy of the current entries, in registration order.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.clone()
    }

    /// Closes and removes every entry.  Returns how many were removed;
    /// calling it on an empty registry does nothing.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut guard = self.connections.write().await;
            guard.drain(..).collect()
        };
        for conn in &drained {
            conn.close().await;
        }
        drained.len()
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
