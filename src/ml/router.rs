// ============================================================
// Layer 5 — Router
// ============================================================
// Decides which peers to ask and how much to trust each answer.
//
//   route()    pooled summary [batch, d]
//                  │ Linear(d → key_dim)             query [batch, key_dim]
//                  │ · keys[uid % num_keys]ᵀ          scores [batch, peers]
//                  │ rank peers by batch-mean score, keep top-k
//                  ▼
//              RoutingPlan { requests (one per slot), scores [batch, k] }
//
//   dispatch() happens in ml::dispatch (network fan-out)
//
//   combine()  responses from any subset of the slots
//                  │ softmax over the responding slots only, per row
//                  │ weighted sum of their [batch, seq, d] contexts
//                  ▼
//              remote context [batch, seq, d]
//
// Scores are only compared within one batch row. Peers that did
// not answer are dropped before the softmax, so the weights of
// every row always sum to one over the data that arrived.
//
// Reference: Lample et al. (2019) Product-Key Memory

use burn::{
    module::Param,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::{activation, Distribution},
};

use crate::data::batcher::TokenBatcher;
use crate::domain::{
    error::{SynapseError, SynapseResult},
    peer::{PeerHandle, RemoteEmbedding},
    token_batch::TokenBatch,
};

#[derive(Config, Debug)]
pub struct RouterConfig {
    /// Width of the pooled summary
    pub x_dim: usize,
    #[config(default = 100)]
    pub key_dim: usize,
    /// Number of learned peer-class keys
    #[config(default = 256)]
    pub num_keys: usize,
    #[config(default = 10)]
    pub top_k: usize,
}

impl RouterConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Router<B> {
        let query = LinearConfig::new(self.x_dim, self.key_dim).init(device);
        let keys  = Param::from_tensor(Tensor::random(
            [self.num_keys, self.key_dim],
            Distribution::Normal(0.0, 1.0 / (self.key_dim as f64).sqrt()),
            device,
        ));
        Router { query, keys, top_k: self.top_k }
    }
}

#[derive(Module, Debug)]
pub struct Router<B: Backend> {
    pub query: Linear<B>,
    /// [num_keys, key_dim]
    pub keys:  Param<Tensor<B, 2>>,
    pub top_k: usize,
}

/// One outgoing request. `slot` is the column of the plan's
/// score tensor that belongs to this peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRequest {
    pub slot: usize,
    pub peer: PeerHandle,
}

/// One usable answer, tagged with the slot it was requested from.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerResponse {
    pub slot:      usize,
    pub peer_uid:  u64,
    pub embedding: RemoteEmbedding,
}

/// The router's decision for one forward pass.
#[derive(Debug)]
pub struct RoutingPlan<B: Backend> {
    pub requests: Vec<PeerRequest>,
    /// [batch, requests.len()]
    pub scores:   Tensor<B, 2>,
}

impl<B: Backend> Router<B> {
    /// Relevance of every peer to every batch row: [batch, peers.len()].
    pub fn score(&self, peers: &[PeerHandle], summary: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = summary.device();
        let [num_keys, _] = self.keys.val().dims();

        let key_rows: Vec<i32> = peers
            .iter()
            .map(|p| (p.uid % num_keys as u64) as i32)
            .collect();
        let key_rows = Tensor::<B, 1, Int>::from_ints(key_rows.as_slice(), &device);
        let peer_keys = self.keys.val().select(0, key_rows); // [peers, key_dim]

        self.query.forward(summary).matmul(peer_keys.transpose())
    }

    /// Pick at most `top_k` peers from the snapshot and build one
    /// request per selected peer. `peers` is only read.
    pub fn route(
        &self,
        peers:   &[PeerHandle],
        summary: Tensor<B, 2>,
        tokens:  &TokenBatch,
    ) -> SynapseResult<RoutingPlan<B>> {
        let [_, dim] = summary.dims();
        let eligible: Vec<PeerHandle> = peers
            .iter()
            .filter(|p| p.can_serve(dim, tokens.seq_len()))
            .cloned()
            .collect();
        if eligible.len() < peers.len() {
            tracing::debug!(
                skipped = peers.len() - eligible.len(),
                "Skipping peers that cannot serve this batch"
            );
        }
        if eligible.is_empty() {
            return Err(SynapseError::NoPeerResponse { queried: 0 });
        }

        let k = self.top_k.min(eligible.len());
        let scores = self.score(&eligible, summary);
        let device = scores.device();

        // Rank on the batch mean; ties keep directory order.
        let mean_scores: Vec<f32> = scores
            .clone()
            .mean_dim(0)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| SynapseError::TensorRead { reason: format!("{e:?}") })?;
        let mut order: Vec<usize> = (0..eligible.len()).collect();
        order.sort_by(|&a, &b| mean_scores[b].total_cmp(&mean_scores[a]));
        order.truncate(k);

        let columns: Vec<i32> = order.iter().map(|&i| i as i32).collect();
        let columns = Tensor::<B, 1, Int>::from_ints(columns.as_slice(), &device);
        let scores  = scores.select(1, columns);

        let requests: Vec<PeerRequest> = order
            .iter()
            .enumerate()
            .map(|(slot, &i)| PeerRequest { slot, peer: eligible[i].clone() })
            .collect();

        tracing::debug!(
            selected = ?requests.iter().map(|r| r.peer.uid).collect::<Vec<_>>(),
            available = eligible.len(),
            "Routed batch"
        );
        Ok(RoutingPlan { requests, scores })
    }

    /// See [`combine`].
    pub fn combine(
        &self,
        responses: &[PeerResponse],
        scores:    Tensor<B, 2>,
    ) -> SynapseResult<Tensor<B, 3>> {
        combine(responses, scores)
    }
}

/// Score-weighted sum of the responses that arrived.
///
/// scores: [batch, slots] for every requested slot. Only the
/// columns of responding slots enter the softmax. Fails with
/// `NoPeerResponse` when `responses` is empty.
pub fn combine<B: Backend>(
    responses: &[PeerResponse],
    scores:    Tensor<B, 2>,
) -> SynapseResult<Tensor<B, 3>> {
    let [batch_size, slots] = scores.dims();
    let first = match responses.first() {
        Some(r) => r,
        None => return Err(SynapseError::NoPeerResponse { queried: slots }),
    };
    let [_, seq_len, dim] = first.embedding.shape;
    let expected = [batch_size, seq_len, dim];

    let device  = scores.device();
    let batcher = TokenBatcher::<B>::new(device.clone());

    let mut columns  = Vec::with_capacity(responses.len());
    let mut contexts = Vec::with_capacity(responses.len());
    for response in responses {
        if response.slot >= slots {
            return Err(SynapseError::ShapeMismatch {
                context:  "router combine (slot)",
                expected: vec![slots],
                actual:   vec![response.slot],
            });
        }
        if response.embedding.shape != expected {
            return Err(SynapseError::ShapeMismatch {
                context:  "router combine",
                expected: expected.to_vec(),
                actual:   response.embedding.shape.to_vec(),
            });
        }
        columns.push(response.slot as i32);
        contexts.push(batcher.embedding(&response.embedding));
    }

    let responders = contexts.len();
    let columns    = Tensor::<B, 1, Int>::from_ints(columns.as_slice(), &device);
    let weights    = activation::softmax(scores.select(1, columns), 1) // [batch, responders]
        .reshape([batch_size, responders, 1, 1]);

    let stacked: Tensor<B, 4> = Tensor::stack(contexts, 1); // [batch, responders, seq, dim]
    Ok((stacked * weights)
        .sum_dim(1)
        .reshape([batch_size, seq_len, dim]))
}
