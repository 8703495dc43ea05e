//! The node's inbound and outbound peer sets.
//!
//! Connections are added from the accept loop and from `connect`, removed
//! from each connection's own task when it ends, and iterated by broadcasts
//! running on yet other tasks. All access goes through one lock and every
//! query returns a snapshot, so a broadcast never observes a set mid-update.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::identity::NodeId;
use crate::peer::{ConnectionId, Direction, PeerConnection};

#[derive(Default)]
struct PeerSets {
    inbound: Vec<Arc<PeerConnection>>,
    outbound: Vec<Arc<PeerConnection>>,
}

impl PeerSets {
    fn set_mut(&mut self, direction: Direction) -> &mut Vec<Arc<PeerConnection>> {
        match direction {
            Direction::Inbound => &mut self.inbound,
            Direction::Outbound => &mut self.outbound,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<PeerConnection>> {
        self.inbound.iter().chain(self.outbound.iter())
    }
}

/// Lock-guarded peer sets.
#[derive(Default)]
pub struct PeerRegistry {
    sets: RwLock<PeerSets>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single push or remove, so a poisoned lock still
    // guards consistent sets.
    fn read(&self) -> RwLockReadGuard<'_, PeerSets> {
        self.sets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PeerSets> {
        self.sets.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection to the set matching its direction.
    pub fn insert(&self, peer: Arc<PeerConnection>) {
        self.write().set_mut(peer.direction()).push(peer);
    }

    /// Remove a connection. Returns it if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<PeerConnection>> {
        let mut guard = self.write();
        let sets = &mut *guard;
        for set in [&mut sets.inbound, &mut sets.outbound] {
            if let Some(pos) = set.iter().position(|p| p.id() == id) {
                return Some(set.remove(pos));
            }
        }
        None
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.read().iter().any(|p| p.id() == id)
    }

    pub fn inbound(&self) -> Vec<Arc<PeerConnection>> {
        self.read().inbound.clone()
    }

    pub fn outbound(&self) -> Vec<Arc<PeerConnection>> {
        self.read().outbound.clone()
    }

    /// Inbound connections followed by outbound ones.
    pub fn all(&self) -> Vec<Arc<PeerConnection>> {
        self.read().iter().cloned().collect()
    }

    /// `(inbound, outbound)` sizes.
    pub fn counts(&self) -> (usize, usize) {
        let sets = self.read();
        (sets.inbound.len(), sets.outbound.len())
    }

    /// The outbound connection dialled to `host:port`, if any.
    pub fn find_outbound(&self, host: &str, port: u16) -> Option<Arc<PeerConnection>> {
        self.read()
            .outbound
            .iter()
            .find(|p| p.host() == host && p.port() == port)
            .cloned()
    }

    /// An inbound connection from `host` that announced `node_id`, if any.
    pub fn find_inbound(&self, host: &str, node_id: &NodeId) -> Option<Arc<PeerConnection>> {
        self.read()
            .inbound
            .iter()
            .find(|p| p.host() == host && p.node_id() == node_id)
            .cloned()
    }

    /// Every connection, in either direction, carrying `node_id`.
    pub fn find_by_node_id(&self, node_id: &NodeId) -> Vec<Arc<PeerConnection>> {
        self.read()
            .iter()
            .filter(|p| p.node_id() == node_id)
            .cloned()
            .collect()
    }
}
