//! Set of currently open peer connections.

use super::link::PeerLink;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local handle for one registered connection.
///
/// Ids are never reused, so a late close event for an old stream cannot
/// remove a newer stream from the same remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    links: DashMap<ConnectionId, Arc<dyn PeerLink>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, link: Arc<dyn PeerLink>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.links.insert(id, link);
        id
    }

    /// Remove a connection. Unknown or already-removed ids are a no-op.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.links.remove(&id).is_some()
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<dyn PeerLink>> {
        self.links.get(&id).map(|entry| entry.value().clone())
    }

    /// Copy of the current membership; safe to hold while entries come and go.
    pub fn all(&self) -> Vec<(ConnectionId, Arc<dyn PeerLink>)> {
        self.links
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn remote_ids(&self) -> Vec<String> {
        self.links
            .iter()
            .map(|entry| entry.value().remote_id().to_string())
            .collect()
    }

    /// Drop every connection, returning how many were removed.
    pub fn clear(&self) -> usize {
        let ids: Vec<ConnectionId> = self.links.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|id| self.unregister(*id)).count()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
