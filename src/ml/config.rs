// ============================================================
// Layer 5 — Synapse Configuration
// ============================================================
// Every knob of the synapse in one burn Config. Defaults
// follow the GPT-2 synapse the network was launched with:
// three layers, two heads, 4x feed-forward width, and the
// network-wide embedding width and vocabulary.
//
// validate() runs before a single parameter is allocated, so
// a config that disagrees with the network never produces a
// half-built model.

use std::time::Duration;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{
    error::{SynapseError, SynapseResult},
    network::NetworkParameters,
};

/// How per-position losses are reduced. The network only
/// defines one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossReduction {
    Mean,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct SynapseConfig {
    /// Width of every internal representation
    #[config(default = 512)]
    pub embedding_dim: usize,

    /// Size of the output projection
    #[config(default = 50258)]
    pub vocab_size: usize,

    /// Transformer depth of each encoder
    #[config(default = 3)]
    pub num_layers: usize,

    #[config(default = 2)]
    pub num_heads: usize,

    /// Feed-forward inner width
    #[config(default = 2048)]
    pub d_ff: usize,

    #[config(default = 0.1)]
    pub dropout: f64,

    /// Longest sequence the position embedding covers
    #[config(default = 1024)]
    pub max_seq_len: usize,

    /// Maximum number of peers queried per forward pass
    #[config(default = 10)]
    pub top_k: usize,

    /// Width of the router's query/key space
    #[config(default = 100)]
    pub key_dim: usize,

    /// Number of learned peer-class keys
    #[config(default = 256)]
    pub num_peer_keys: usize,

    /// Per-peer request budget
    #[config(default = 1000)]
    pub request_timeout_ms: u64,

    #[config(default = "LossReduction::Mean")]
    pub loss_reduction: LossReduction,
}

impl SynapseConfig {
    /// Check this config against the network constants and for
    /// internal consistency.
    pub fn validate(&self, network: &NetworkParameters) -> SynapseResult<()> {
        if self.embedding_dim != network.embedding_dim {
            return Err(SynapseError::ConfigMismatch {
                field:    "embedding_dim",
                expected: network.embedding_dim,
                actual:   self.embedding_dim,
            });
        }
        if self.vocab_size != network.vocab_size {
            return Err(SynapseError::ConfigMismatch {
                field:    "vocab_size",
                expected: network.vocab_size,
                actual:   self.vocab_size,
            });
        }

        let sizes = [
            ("embedding_dim", self.embedding_dim),
            ("vocab_size", self.vocab_size),
            ("num_layers", self.num_layers),
            ("num_heads", self.num_heads),
            ("d_ff", self.d_ff),
            ("max_seq_len", self.max_seq_len),
            ("top_k", self.top_k),
            ("key_dim", self.key_dim),
            ("num_peer_keys", self.num_peer_keys),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(SynapseError::InvalidConfig {
                reason: format!("{name} must be positive"),
            });
        }
        if self.embedding_dim % self.num_heads != 0 {
            return Err(SynapseError::InvalidConfig {
                reason: format!(
                    "embedding_dim {} is not divisible by num_heads {}",
                    self.embedding_dim, self.num_heads
                ),
            });
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(SynapseError::InvalidConfig {
                reason: format!("dropout {} outside [0, 1)", self.dropout),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(SynapseError::InvalidConfig {
                reason: "request_timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::NETWORK_DIM;

    #[test]
    fn test_defaults_match_network() {
        let cfg = SynapseConfig::new();
        assert!(cfg.validate(&NetworkParameters::default()).is_ok());
        assert_eq!(cfg.top_k, 10);
        assert_eq!(cfg.loss_reduction, LossReduction::Mean);
    }

    #[test]
    fn test_embedding_dim_mismatch() {
        let cfg = SynapseConfig::new().with_embedding_dim(256);
        match cfg.validate(&NetworkParameters::default()) {
            Err(SynapseError::ConfigMismatch { field, expected, actual }) => {
                assert_eq!(field, "embedding_dim");
                assert_eq!(expected, NETWORK_DIM);
                assert_eq!(actual, 256);
            }
            other => panic!("expected ConfigMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_vocab_mismatch() {
        let cfg = SynapseConfig::new().with_vocab_size(30522);
        assert!(matches!(
            cfg.validate(&NetworkParameters::default()),
            Err(SynapseError::ConfigMismatch { field: "vocab_size", .. })
        ));
    }

    #[test]
    fn test_heads_must_divide_width() {
        let network = NetworkParameters::new(10, 32);
        let cfg = SynapseConfig::new()
            .with_embedding_dim(10)
            .with_vocab_size(32)
            .with_num_heads(3);
        assert!(matches!(
            cfg.validate(&network),
            Err(SynapseError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let cfg = SynapseConfig::new().with_top_k(0);
        assert!(cfg.validate(&NetworkParameters::default()).is_err());
    }

    #[test]
    fn test_dropout_range() {
        let cfg = SynapseConfig::new().with_dropout(1.0);
        assert!(cfg.validate(&NetworkParameters::default()).is_err());
    }
}
