// ============================================================
// Layer 3 — Peers and Remote Embeddings
// ============================================================
// A PeerHandle is what the peer directory hands out: an id,
// an address, and what the peer claims it can do. The router
// only ever borrows a snapshot of these for one forward pass.
//
// A RemoteEmbedding is what comes back over the wire: a flat
// f32 buffer plus the shape the peer claims it has. Nothing
// about it is trusted until validate() has checked the shape
// against the request and every value for finiteness.

use serde::{Deserialize, Serialize};

use crate::domain::error::TransportError;

/// What a peer advertises about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCapabilities {
    /// Width of the embeddings the peer returns
    pub embedding_dim: usize,

    /// Longest token sequence the peer accepts
    pub max_seq_len: usize,
}

/// Opaque reference to a remote synapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHandle {
    /// Network-wide unique id (also selects the peer's routing key)
    pub uid: u64,

    /// Transport address, e.g. "10.0.0.7:8091"
    pub address: String,

    pub capabilities: PeerCapabilities,
}

impl PeerHandle {
    pub fn new(uid: u64, address: impl Into<String>, capabilities: PeerCapabilities) -> Self {
        Self { uid, address: address.into(), capabilities }
    }

    /// True if this peer can serve a (seq_len)-token request at `embedding_dim` width.
    pub fn can_serve(&self, embedding_dim: usize, seq_len: usize) -> bool {
        self.capabilities.embedding_dim == embedding_dim && self.capabilities.max_seq_len >= seq_len
    }
}

/// A (batch, seq, dim) embedding as returned by a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEmbedding {
    pub shape:  [usize; 3],
    pub values: Vec<f32>,
}

impl RemoteEmbedding {
    pub fn new(shape: [usize; 3], values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// Check the response against the shape that was requested.
    pub fn validate(&self, expected: [usize; 3]) -> Result<(), TransportError> {
        if self.shape != expected {
            return Err(TransportError::Malformed {
                reason: format!("shape {:?}, expected {:?}", self.shape, expected),
            });
        }
        let len: usize = expected.iter().product();
        if self.values.len() != len {
            return Err(TransportError::Malformed {
                reason: format!("{} values for shape {:?}", self.values.len(), expected),
            });
        }
        if let Some(i) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(TransportError::Malformed {
                reason: format!("non-finite value at index {i}"),
            });
        }
        Ok(())
    }
}
