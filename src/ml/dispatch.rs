// ============================================================
// Layer 5 — Peer Dispatch (fan-out / fan-in)
// ============================================================
// The only place a forward pass waits on the network.
//
//   requests ──► JoinSet: one task per selected peer
//                   each task = timeout(budget, transport.send)
//                          │
//   responses ◄── join_next() until every task has finished
//
// All requests are in flight at once, so the remote path costs
// roughly the slowest accepted answer, never the sum. A peer
// that times out, errors, or sends back a malformed tensor is
// logged and left out. Nothing is retried here; retry policy
// belongs to the transport.
//
// Responses are returned sorted by slot so that aggregation
// does not depend on arrival order.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;

use crate::domain::{
    error::TransportError,
    token_batch::TokenBatch,
    traits::{DispatchTransport, PeerDirectory},
    peer::PeerHandle,
};
use crate::ml::router::{PeerRequest, PeerResponse};

/// The network side of the router: who can be asked, and how.
pub struct Dispatcher {
    directory: Arc<dyn PeerDirectory>,
    transport: Arc<dyn DispatchTransport>,
    timeout:   Duration,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn DispatchTransport>,
        timeout:   Duration,
    ) -> Self {
        Self { directory, transport, timeout }
    }

    /// Snapshot of the peer directory for one forward pass.
    pub fn peers(&self) -> Vec<PeerHandle> {
        self.directory.current_peers()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `tokens` to every requested peer concurrently and
    /// collect the answers that arrive in time with shape
    /// `expected`. Must be called inside a tokio runtime.
    pub async fn dispatch(
        &self,
        requests: &[PeerRequest],
        tokens:   &TokenBatch,
        expected: [usize; 3],
    ) -> Vec<PeerResponse> {
        let tokens = Arc::new(tokens.clone());
        let mut tasks = JoinSet::new();

        for request in requests {
            let transport = Arc::clone(&self.transport);
            let tokens    = Arc::clone(&tokens);
            let peer      = request.peer.clone();
            let slot      = request.slot;
            let budget    = self.timeout;

            tasks.spawn(async move {
                let outcome = match tokio::time::timeout(budget, transport.send(&peer, &tokens, budget)).await {
                    Ok(result) => result,
                    Err(_)     => Err(TransportError::Timeout { after: budget }),
                };
                (slot, peer.uid, outcome)
            });
        }

        let mut responses = Vec::with_capacity(requests.len());
        while let Some(joined) = tasks.join_next().await {
            let (slot, peer_uid, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!(error = %e, "Peer request task did not complete");
                    continue;
                }
            };
            match outcome.and_then(|embedding| embedding.validate(expected).map(|_| embedding)) {
                Ok(embedding) => responses.push(PeerResponse { slot, peer_uid, embedding }),
                Err(e) => tracing::warn!(peer = peer_uid, error = %e, "Excluding peer from aggregation"),
            }
        }

        responses.sort_by_key(|r| r.slot);
        tracing::debug!(
            queried = requests.len(),
            responded = responses.len(),
            "Dispatch finished"
        );
        responses
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, time::Instant};

    use async_trait::async_trait;

    use crate::domain::peer::{PeerCapabilities, RemoteEmbedding};

    #[derive(Clone, Copy)]
    enum Script {
        After(u64),
        Hang,
        Fail,
        WrongShape,
    }

    struct ScriptedTransport {
        scripts: HashMap<u64, Script>,
    }

    #[async_trait]
    impl DispatchTransport for ScriptedTransport {
        async fn send(
            &self,
            peer:     &PeerHandle,
            tokens:   &TokenBatch,
            _timeout: Duration,
        ) -> Result<RemoteEmbedding, TransportError> {
            let [batch, seq] = tokens.dims();
            match self.scripts.get(&peer.uid).copied().unwrap_or(Script::Fail) {
                Script::After(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(RemoteEmbedding::new([batch, seq, 4], vec![peer.uid as f32; batch * seq * 4]))
                }
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(TransportError::Unreachable { reason: "hung".into() })
                }
                Script::Fail => Err(TransportError::Unreachable { reason: "refused".into() }),
                Script::WrongShape => Ok(RemoteEmbedding::new([batch, seq, 5], vec![0.0; batch * seq * 5])),
            }
        }
    }

    struct NoPeers;

    impl PeerDirectory for NoPeers {
        fn current_peers(&self) -> Vec<PeerHandle> {
            Vec::new()
        }
    }

    fn dispatcher(scripts: &[(u64, Script)], timeout_ms: u64) -> Dispatcher {
        let transport = ScriptedTransport { scripts: scripts.iter().copied().collect() };
        Dispatcher::new(Arc::new(NoPeers), Arc::new(transport), Duration::from_millis(timeout_ms))
    }

    fn requests(uids: &[u64]) -> Vec<PeerRequest> {
        uids.iter()
            .enumerate()
            .map(|(slot, &uid)| PeerRequest {
                slot,
                peer: PeerHandle::new(uid, "sim", PeerCapabilities { embedding_dim: 4, max_seq_len: 8 }),
            })
            .collect()
    }

    fn tokens() -> TokenBatch {
        TokenBatch::from_rows(vec![vec![1, 2, 3]]).unwrap()
    }

    #[tokio::test]
    async fn test_requests_run_concurrently() {
        let scripts: Vec<(u64, Script)> = (1..=5).map(|uid| (uid, Script::After(150))).collect();
        let d = dispatcher(&scripts, 2000);

        let started   = Instant::now();
        let responses = d.dispatch(&requests(&[1, 2, 3, 4, 5]), &tokens(), [1, 3, 4]).await;

        assert_eq!(responses.len(), 5);
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_hanging_peer_is_cut_off_by_timeout() {
        let d = dispatcher(&[(1, Script::After(10)), (2, Script::Hang)], 200);

        let started   = Instant::now();
        let responses = d.dispatch(&requests(&[1, 2]), &tokens(), [1, 3, 4]).await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].peer_uid, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failed_and_malformed_peers_excluded() {
        let d = dispatcher(&[(1, Script::Fail), (2, Script::WrongShape), (3, Script::After(0))], 500);
        let responses = d.dispatch(&requests(&[1, 2, 3]), &tokens(), [1, 3, 4]).await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].slot, 2);
        assert_eq!(responses[0].peer_uid, 3);
    }

    #[tokio::test]
    async fn test_responses_sorted_by_slot() {
        // Slot 0 answers last.
        let d = dispatcher(&[(1, Script::After(120)), (2, Script::After(10)), (3, Script::After(60))], 1000);
        let responses = d.dispatch(&requests(&[1, 2, 3]), &tokens(), [1, 3, 4]).await;

        let slots: Vec<usize> = responses.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_no_requests_no_responses() {
        let d = dispatcher(&[], 100);
        assert!(d.dispatch(&[], &tokens(), [1, 3, 4]).await.is_empty());
        assert!(d.peers().is_empty());
    }
}
