// ============================================================
// Layer 3 — Core Traits (Collaborator Seams)
// ============================================================
// The synapse talks to the outside world through exactly two
// traits. Both are injected at construction, so tests can hand
// in scripted fakes and the CLI can hand in file-backed and
// simulated implementations.
//
//   PeerDirectory     — who is on the network right now
//   DispatchTransport — send tokens to one peer, get back an
//                       embedding, a timeout, or an error
//
// The core never manages connections, retries, or wire
// encoding. It only consumes the outcome of one send().
//
// Reference: Rust Book §10 (Traits), §17 (Trait Objects)

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{
    error::TransportError,
    peer::{PeerHandle, RemoteEmbedding},
    token_batch::TokenBatch,
};

// ─── PeerDirectory ────────────────────────────────────────────────────────────
/// Point-in-time view of network membership.
///
/// Implementations:
///   - StaticPeerDirectory → peers listed in a JSON file
pub trait PeerDirectory: Send + Sync {
    /// Snapshot of the currently reachable peers.
    /// Membership may differ on the next call.
    fn current_peers(&self) -> Vec<PeerHandle>;
}

// ─── DispatchTransport ────────────────────────────────────────────────────────
/// Carries one request to one peer.
///
/// Implementations:
///   - SimulatedTransport → in-process peers for local runs
#[async_trait]
pub trait DispatchTransport: Send + Sync {
    /// Send `tokens` to `peer` and wait at most `timeout` for its
    /// (batch, seq, dim) context embedding.
    async fn send(
        &self,
        peer:    &PeerHandle,
        tokens:  &TokenBatch,
        timeout: Duration,
    ) -> Result<RemoteEmbedding, TransportError>;
}
