// ============================================================
// Layer 3 — Network Parameters
// ============================================================
// Every node on the network must agree on two numbers:
//   - the width of the embeddings exchanged between peers
//   - the size of the shared token vocabulary
//
// They are carried in one immutable value that is passed to
// every constructor. Components validate against the value
// they were given; nothing reads an ambient global.

use serde::{Deserialize, Serialize};

/// Embedding width shared by every node on the network.
pub const NETWORK_DIM: usize = 512;

/// GPT-2 vocabulary plus the network's padding token.
pub const NETWORK_VOCAB_SIZE: usize = 50258;

/// The network-wide constants a synapse must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameters {
    /// Width of every embedding exchanged on the network
    pub embedding_dim: usize,

    /// Number of token ids every node understands
    pub vocab_size: usize,
}

impl NetworkParameters {
    pub fn new(embedding_dim: usize, vocab_size: usize) -> Self {
        Self { embedding_dim, vocab_size }
    }
}

impl Default for NetworkParameters {
    fn default() -> Self {
        Self::new(NETWORK_DIM, NETWORK_VOCAB_SIZE)
    }
}
