// ============================================================
// Layer 6 — Static Peer Directory
// ============================================================
// A PeerDirectory backed by a fixed list, typically read from
// the peers file. The list can be swapped wholesale with
// replace(); every forward pass sees either the old or the new
// list, never a mix.

use std::sync::RwLock;

use crate::domain::{peer::PeerHandle, traits::PeerDirectory};

#[derive(Debug, Default)]
pub struct StaticPeerDirectory {
    peers: RwLock<Vec<PeerHandle>>,
}

impl StaticPeerDirectory {
    pub fn new(peers: Vec<PeerHandle>) -> Self {
        Self { peers: RwLock::new(peers) }
    }

    /// Replace the whole membership list.
    pub fn replace(&self, peers: Vec<PeerHandle>) {
        let count = peers.len();
        match self.peers.write() {
            Ok(mut guard) => *guard = peers,
            Err(poisoned) => *poisoned.into_inner() = peers,
        }
        tracing::debug!(peers = count, "Peer directory replaced");
    }

    pub fn len(&self) -> usize {
        self.current_peers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerDirectory for StaticPeerDirectory {
    fn current_peers(&self) -> Vec<PeerHandle> {
        match self.peers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
