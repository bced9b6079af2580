// ============================================================
// Layer 6 — Simulated Transport
// ============================================================
// An in-process DispatchTransport for running a node without a
// network. Each simulated peer has a latency and a behaviour:
//
//   Respond   → after latency_ms, a (batch, seq, dim) embedding
//   Fail      → after latency_ms, Unreachable
//   Malformed → after latency_ms, an embedding one column too wide
//
// Embeddings are deterministic: the values for one position are
// drawn from a StdRng seeded by (peer uid, token id), so the
// same peer always answers the same token the same way.
//
// Peers file format (JSON):
//
//   { "peers": [
//       { "handle": { "uid": 1, "address": "sim://1",
//                     "capabilities": { "embedding_dim": 512, "max_seq_len": 1024 } },
//         "latency_ms": 20, "behaviour": "respond" },
//       ...
//   ] }

use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::{
    error::TransportError,
    network::NetworkParameters,
    peer::{PeerCapabilities, PeerHandle, RemoteEmbedding},
    token_batch::TokenBatch,
    traits::DispatchTransport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerBehaviour {
    Respond,
    Fail,
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPeer {
    pub handle:     PeerHandle,
    pub latency_ms: u64,
    pub behaviour:  PeerBehaviour,
}

impl SimulatedPeer {
    pub fn new(handle: PeerHandle, latency_ms: u64, behaviour: PeerBehaviour) -> Self {
        Self { handle, latency_ms, behaviour }
    }
}

/// On-disk list of simulated peers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerFile {
    pub peers: Vec<SimulatedPeer>,
}

impl PeerFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read peers from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid peers file '{}'", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Cannot write peers to '{}'", path.display()))
    }

    /// A small mixed population for local runs: mostly healthy
    /// peers, one that refuses and one that answers garbage.
    pub fn sample(network: &NetworkParameters, max_seq_len: usize) -> Self {
        let capabilities = PeerCapabilities { embedding_dim: network.embedding_dim, max_seq_len };
        let peers = (1..=6u64)
            .map(|uid| {
                let behaviour = match uid {
                    5 => PeerBehaviour::Fail,
                    6 => PeerBehaviour::Malformed,
                    _ => PeerBehaviour::Respond,
                };
                SimulatedPeer::new(PeerHandle::new(uid, format!("sim://{uid}"), capabilities), 10 * uid, behaviour)
            })
            .collect();
        Self { peers }
    }

    pub fn handles(&self) -> Vec<PeerHandle> {
        self.peers.iter().map(|p| p.handle.clone()).collect()
    }
}

pub struct SimulatedTransport {
    peers: HashMap<u64, SimulatedPeer>,
}

impl SimulatedTransport {
    pub fn new(peers: impl IntoIterator<Item = SimulatedPeer>) -> Self {
        Self { peers: peers.into_iter().map(|p| (p.handle.uid, p)).collect() }
    }

    /// Deterministic (batch, seq, dim) answer of peer `uid`.
    fn embed(uid: u64, tokens: &TokenBatch, dim: usize) -> RemoteEmbedding {
        let [batch_size, seq_len] = tokens.dims();
        let mut values = Vec::with_capacity(batch_size * seq_len * dim);
        for &token in tokens.ids() {
            let seed = uid.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ u64::from(token);
            let mut rng = StdRng::seed_from_u64(seed);
            values.extend((0..dim).map(|_| rng.gen_range(-1.0f32..1.0)));
        }
        RemoteEmbedding::new([batch_size, seq_len, dim], values)
    }
}

#[async_trait]
impl DispatchTransport for SimulatedTransport {
    async fn send(
        &self,
        peer:    &PeerHandle,
        tokens:  &TokenBatch,
        timeout: Duration,
    ) -> Result<RemoteEmbedding, TransportError> {
        let sim = self.peers.get(&peer.uid).ok_or_else(|| TransportError::Unreachable {
            reason: format!("no simulated peer with uid {}", peer.uid),
        })?;

        let latency = Duration::from_millis(sim.latency_ms);
        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout { after: timeout });
        }
        tokio::time::sleep(latency).await;

        let dim = sim.handle.capabilities.embedding_dim;
        match sim.behaviour {
            PeerBehaviour::Respond   => Ok(Self::embed(peer.uid, tokens, dim)),
            PeerBehaviour::Fail      => Err(TransportError::Unreachable { reason: "simulated failure".into() }),
            PeerBehaviour::Malformed => Ok(Self::embed(peer.uid, tokens, dim + 1)),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn peer(uid: u64, latency_ms: u64, behaviour: PeerBehaviour) -> SimulatedPeer {
        let capabilities = PeerCapabilities { embedding_dim: 8, max_seq_len: 16 };
        SimulatedPeer::new(PeerHandle::new(uid, "sim", capabilities), latency_ms, behaviour)
    }

    fn tokens() -> TokenBatch {
        TokenBatch::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap()
    }

    #[tokio::test]
    async fn test_respond_is_deterministic_per_peer() {
        let a = peer(1, 0, PeerBehaviour::Respond);
        let b = peer(2, 0, PeerBehaviour::Respond);
        let transport = SimulatedTransport::new(vec![a.clone(), b.clone()]);
        let budget = Duration::from_millis(100);

        let first  = transport.send(&a.handle, &tokens(), budget).await.unwrap();
        let again  = transport.send(&a.handle, &tokens(), budget).await.unwrap();
        let other  = transport.send(&b.handle, &tokens(), budget).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first.values, other.values);
        assert!(first.validate([2, 3, 8]).is_ok());
    }

    #[tokio::test]
    async fn test_same_token_same_answer() {
        let a = peer(7, 0, PeerBehaviour::Respond);
        let transport = SimulatedTransport::new(vec![a.clone()]);
        let batch = TokenBatch::from_rows(vec![vec![9, 9]]).unwrap();

        let out = transport.send(&a.handle, &batch, Duration::from_millis(100)).await.unwrap();
        assert_eq!(out.values[..8], out.values[8..]);
    }

    #[tokio::test]
    async fn test_failing_and_malformed_peers() {
        let fail = peer(1, 0, PeerBehaviour::Fail);
        let bad  = peer(2, 0, PeerBehaviour::Malformed);
        let transport = SimulatedTransport::new(vec![fail.clone(), bad.clone()]);
        let budget = Duration::from_millis(100);

        assert!(matches!(
            transport.send(&fail.handle, &tokens(), budget).await,
            Err(TransportError::Unreachable { .. })
        ));
        let malformed = transport.send(&bad.handle, &tokens(), budget).await.unwrap();
        assert!(matches!(malformed.validate([2, 3, 8]), Err(TransportError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_slow_peer_times_out() {
        let slow = peer(1, 500, PeerBehaviour::Respond);
        let transport = SimulatedTransport::new(vec![slow.clone()]);
        let result = transport.send(&slow.handle, &tokens(), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(TransportError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_unknown_peer_is_unreachable() {
        let transport = SimulatedTransport::new(Vec::new());
        let stranger  = peer(42, 0, PeerBehaviour::Respond);
        let result = transport.send(&stranger.handle, &tokens(), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(TransportError::Unreachable { .. })));
    }

    #[test]
    fn test_peer_file_round_trip_through_disk() {
        let dir  = std::env::temp_dir().join(format!("synapse_node_peers_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("peers.json");

        let file = PeerFile::sample(&NetworkParameters::default(), 1024);
        file.save(&path).unwrap();
        let loaded = PeerFile::load(&path).unwrap();

        assert_eq!(loaded.peers, file.peers);
        assert_eq!(loaded.handles().len(), 6);
        assert!(loaded.peers.iter().any(|p| p.behaviour == PeerBehaviour::Malformed));

        fs::remove_dir_all(&dir).ok();
    }
}
