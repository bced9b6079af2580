// ============================================================
// Layer 5 — Synapse (the forward pass)
// ============================================================
// Ties every component together:
//
//   tokens ─► encoder ─────────────┬────────────────────────────┐
//                                  │ (remote)                   │
//                                  ▼                            │
//                       pooler ─► router.route                  │
//                                  │                            │
//                       dispatcher.dispatch (peers, async)      │
//                                  │                            │
//                       router.combine ─► remote_context ─┐     │
//                                                         │     │
//   tokens ─► context_encoder ─► local_context ──┐        │     │
//                                                ▼        ▼     ▼
//                                   hidden_layer.fuse(encoding, context)
//                                                │
//                                  target_layer ─► next-token loss
//                                                │
//                                  LossComposer ─► loss
//
// If no peer answers, the remote branch is skipped for this
// call and the result is exactly the local-only result.
//
// Learned parameters live in SynapseModel (a burn Module). The
// peer directory and transport live in the Dispatcher. A
// forward pass only reads the model; the optimizer replaces it
// between passes through map_model().

use std::sync::Arc;

use burn::prelude::*;

use crate::data::batcher::TokenBatcher;
use crate::domain::{
    error::{SynapseError, SynapseResult},
    network::NetworkParameters,
    token_batch::TokenBatch,
    traits::{DispatchTransport, PeerDirectory},
};
use crate::ml::{
    config::SynapseConfig,
    dispatch::Dispatcher,
    encoder::{TransformerEncoder, TransformerEncoderConfig},
    fusion::{FusionConfig, FusionLayer},
    head::{next_token_loss, TaskHead, TaskHeadConfig},
    loss::{distillation_loss, LossComposer},
    pooler::{Pooler, PoolerConfig},
    router::{Router, RouterConfig},
};

// ─── Model ────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct SynapseModel<B: Backend> {
    /// [batch, seq] → [batch, seq, d]; feeds routing and fusion
    pub encoder:         TransformerEncoder<B>,
    /// [batch, seq, d] → [batch, d]
    pub pooler:          Pooler<B>,
    pub router:          Router<B>,
    /// Student encoder distilled towards the remote context
    pub context_encoder: TransformerEncoder<B>,
    /// Shared by the local and remote paths
    pub hidden_layer:    FusionLayer<B>,
    /// Shared by the local and remote paths
    pub target_layer:    TaskHead<B>,
}

impl SynapseConfig {
    /// Validate against `network`, then allocate every parameter.
    pub fn init_model<B: Backend>(
        &self,
        network: &NetworkParameters,
        device:  &B::Device,
    ) -> SynapseResult<SynapseModel<B>> {
        self.validate(network)?;

        let encoder_cfg = TransformerEncoderConfig::new(
            self.vocab_size, self.max_seq_len, self.embedding_dim,
            self.num_heads, self.num_layers, self.d_ff, self.dropout,
        );
        Ok(SynapseModel {
            encoder:         encoder_cfg.init(device),
            pooler:          PoolerConfig::new(self.embedding_dim).init(device),
            router:          RouterConfig::new(self.embedding_dim)
                                 .with_key_dim(self.key_dim)
                                 .with_num_keys(self.num_peer_keys)
                                 .with_top_k(self.top_k)
                                 .init(device),
            context_encoder: encoder_cfg.init(device),
            hidden_layer:    FusionConfig::new(self.embedding_dim).init(device),
            target_layer:    TaskHeadConfig::new(self.embedding_dim, self.vocab_size).init(device),
        })
    }
}

// ─── Forward result ───────────────────────────────────────────────────────────
/// What happened to the remote path on one call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// `remote` was false.
    NotRequested,
    /// Requested, but nothing usable came back; the call ran local-only.
    Skipped { reason: String },
    /// Remote context was built from `responded` of `queried` peers.
    Joined { queried: usize, responded: usize },
}

/// Everything one forward pass produced. `None` means "not
/// computed on this call", never zero.
#[derive(Debug)]
pub struct ForwardResult<B: Backend> {
    /// Finite scalar [1]; zero when no term was computed
    pub loss:                 Tensor<B, 1>,
    /// [batch, seq, d]
    pub local_hidden:         Tensor<B, 3>,
    /// [batch, seq, vocab]
    pub local_target_logits:  Option<Tensor<B, 3>>,
    pub local_target_loss:    Option<Tensor<B, 1>>,
    /// [batch, seq, d]
    pub remote_hidden:        Option<Tensor<B, 3>>,
    /// [batch, seq, vocab]
    pub remote_target_logits: Option<Tensor<B, 3>>,
    pub remote_target_loss:   Option<Tensor<B, 1>>,
    pub distillation_loss:    Option<Tensor<B, 1>>,
    pub remote:               RemoteOutcome,
}

// ─── Synapse ──────────────────────────────────────────────────────────────────
pub struct Synapse<B: Backend> {
    model:       SynapseModel<B>,
    network:     NetworkParameters,
    max_seq_len: usize,
    dispatcher:  Dispatcher,
    device:      B::Device,
}

impl<B: Backend> Synapse<B> {
    /// Build a synapse. Fails before allocating anything if
    /// `config` disagrees with `network`.
    pub fn new(
        config:    &SynapseConfig,
        network:   NetworkParameters,
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn DispatchTransport>,
        device:    &B::Device,
    ) -> SynapseResult<Self> {
        let model = config.init_model::<B>(&network, device)?;
        tracing::info!(
            "Synapse ready: {} layers, dim={}, vocab={}, top_k={}",
            config.num_layers, config.embedding_dim, config.vocab_size, config.top_k,
        );
        Ok(Self {
            model,
            network,
            max_seq_len: config.max_seq_len,
            dispatcher:  Dispatcher::new(directory, transport, config.request_timeout()),
            device:      device.clone(),
        })
    }

    pub fn model(&self) -> &SynapseModel<B> {
        &self.model
    }

    pub fn network(&self) -> &NetworkParameters {
        &self.network
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Replace the parameters, e.g. with the output of an
    /// optimizer step. Only call between forward passes.
    pub fn map_model(self, update: impl FnOnce(SynapseModel<B>) -> SynapseModel<B>) -> Self {
        Self { model: update(self.model), ..self }
    }

    /// Local-only inference: no network, no loss.
    /// Returns the local hidden state [batch, seq, d].
    pub fn forward_text(&self, tokens: &TokenBatch) -> SynapseResult<Tensor<B, 3>> {
        let input         = self.input(tokens)?;
        let encoding      = self.model.encoder.encode(input.clone());
        let local_context = self.model.context_encoder.encode(input);
        self.model.hidden_layer.fuse(encoding, local_context)
    }

    /// Full forward pass.
    ///
    /// `training` adds the next-token losses; `remote` queries
    /// peers and adds the remote path and distillation when at
    /// least one peer answers. Must run inside a tokio runtime
    /// when `remote` is true.
    pub async fn forward(
        &self,
        tokens:   &TokenBatch,
        training: bool,
        remote:   bool,
    ) -> SynapseResult<ForwardResult<B>> {
        if training && tokens.seq_len() < 2 {
            return Err(SynapseError::ShapeMismatch {
                context:  "training forward (needs seq_len >= 2)",
                expected: vec![tokens.batch_size(), 2],
                actual:   tokens.dims().to_vec(),
            });
        }
        let input    = self.input(tokens)?;
        let encoding = self.model.encoder.encode(input.clone());

        let (remote_context, remote_outcome) = if remote {
            match self.remote_context(encoding.clone(), tokens).await {
                Ok((context, outcome)) => (Some(context), outcome),
                Err(SynapseError::NoPeerResponse { queried }) => {
                    tracing::warn!(queried, "No peer responded, continuing local-only");
                    let reason = format!("no peer responded ({queried} queried)");
                    (None, RemoteOutcome::Skipped { reason })
                }
                Err(e) => return Err(e),
            }
        } else {
            (None, RemoteOutcome::NotRequested)
        };

        let local_context = self.model.context_encoder.encode(input.clone());
        let local_hidden  = self.model.hidden_layer.fuse(encoding.clone(), local_context.clone())?;

        let (local_target_logits, local_target_loss) = if training {
            let logits = self.model.target_layer.logits(local_hidden.clone())?;
            let loss   = next_token_loss(logits.clone(), input.clone())?;
            (Some(logits), Some(loss))
        } else {
            (None, None)
        };

        let mut remote_hidden        = None;
        let mut remote_target_logits = None;
        let mut remote_target_loss   = None;
        let mut distillation         = None;
        if let Some(context) = remote_context {
            let hidden = self.model.hidden_layer.fuse(encoding, context.clone())?;
            if training {
                let logits = self.model.target_layer.logits(hidden.clone())?;
                remote_target_loss   = Some(next_token_loss(logits.clone(), input)?);
                remote_target_logits = Some(logits);
            }
            remote_hidden = Some(hidden);
            distillation  = Some(distillation_loss(local_context, context));
        }

        let loss = LossComposer::new()
            .with_local_target(local_target_loss.clone())
            .with_remote_target(remote_target_loss.clone())
            .with_distillation(distillation.clone())
            .compose(&self.device)?;

        Ok(ForwardResult {
            loss,
            local_hidden,
            local_target_logits,
            local_target_loss,
            remote_hidden,
            remote_target_logits,
            remote_target_loss,
            distillation_loss: distillation,
            remote: remote_outcome,
        })
    }

    /// Route, dispatch, combine.
    async fn remote_context(
        &self,
        encoding: Tensor<B, 3>,
        tokens:   &TokenBatch,
    ) -> SynapseResult<(Tensor<B, 3>, RemoteOutcome)> {
        let summary = self.model.pooler.pool(encoding);
        let peers   = self.dispatcher.peers();
        let plan    = self.model.router.route(&peers, summary, tokens)?;

        let [batch_size, seq_len] = tokens.dims();
        let expected  = [batch_size, seq_len, self.network.embedding_dim];
        let responses = self.dispatcher.dispatch(&plan.requests, tokens, expected).await;

        let context = self.model.router.combine(&responses, plan.scores)?;
        Ok((context, RemoteOutcome::Joined {
            queried:   plan.requests.len(),
            responded: responses.len(),
        }))
    }

    /// Check the batch against the vocabulary and position
    /// range, then move it onto the device.
    fn input(&self, tokens: &TokenBatch) -> SynapseResult<Tensor<B, 2, Int>> {
        if tokens.seq_len() > self.max_seq_len {
            return Err(SynapseError::InvalidTokens {
                reason: format!("sequence of {} exceeds max_seq_len {}", tokens.seq_len(), self.max_seq_len),
            });
        }
        let max_id = tokens.max_id() as usize;
        if max_id >= self.network.vocab_size {
            return Err(SynapseError::InvalidTokens {
                reason: format!("token id {max_id} outside vocabulary of {}", self.network.vocab_size),
            });
        }
        Ok(TokenBatcher::<B>::new(self.device.clone()).tokens(tokens))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, time::Duration};

    use async_trait::async_trait;
    use burn::backend::{Autodiff, NdArray};

    use crate::domain::{
        error::TransportError,
        peer::{PeerCapabilities, PeerHandle, RemoteEmbedding},
    };

    type TestBackend = Autodiff<NdArray>;

    const DIM:   usize = 16;
    const VOCAB: usize = 32;

    fn network() -> NetworkParameters {
        NetworkParameters::new(DIM, VOCAB)
    }

    fn config() -> SynapseConfig {
        SynapseConfig::new()
            .with_embedding_dim(DIM)
            .with_vocab_size(VOCAB)
            .with_num_layers(1)
            .with_num_heads(2)
            .with_d_ff(32)
            .with_dropout(0.0)
            .with_max_seq_len(16)
            .with_top_k(3)
            .with_key_dim(8)
            .with_num_peer_keys(8)
            .with_request_timeout_ms(300)
    }

    struct FixedDirectory(Vec<PeerHandle>);

    impl PeerDirectory for FixedDirectory {
        fn current_peers(&self) -> Vec<PeerHandle> {
            self.0.clone()
        }
    }

    /// Peers listed answer with a constant embedding; everyone else refuses.
    struct ConstantTransport {
        answers: HashMap<u64, f32>,
    }

    #[async_trait]
    impl DispatchTransport for ConstantTransport {
        async fn send(
            &self,
            peer:     &PeerHandle,
            tokens:   &TokenBatch,
            _timeout: Duration,
        ) -> Result<RemoteEmbedding, TransportError> {
            let [batch, seq] = tokens.dims();
            match self.answers.get(&peer.uid) {
                Some(&value) => Ok(RemoteEmbedding::new([batch, seq, DIM], vec![value; batch * seq * DIM])),
                None => Err(TransportError::Unreachable { reason: "refused".into() }),
            }
        }
    }

    fn peers(uids: &[u64]) -> Vec<PeerHandle> {
        uids.iter()
            .map(|&uid| PeerHandle::new(uid, "sim", PeerCapabilities { embedding_dim: DIM, max_seq_len: 16 }))
            .collect()
    }

    fn synapse(directory: &[u64], answering: &[(u64, f32)]) -> Synapse<TestBackend> {
        Synapse::new(
            &config(),
            network(),
            Arc::new(FixedDirectory(peers(directory))),
            Arc::new(ConstantTransport { answers: answering.iter().copied().collect() }),
            &Default::default(),
        )
        .unwrap()
    }

    fn tokens() -> TokenBatch {
        TokenBatch::from_rows(vec![vec![1, 5, 9, 3, 7], vec![2, 4, 6, 8, 10]]).unwrap()
    }

    fn value(t: &Tensor<TestBackend, 1>) -> f32 {
        t.clone().into_scalar().elem::<f32>()
    }

    #[test]
    fn test_forward_text_shape_and_finite() {
        let s = synapse(&[], &[]);
        let hidden = s.forward_text(&tokens()).unwrap();
        assert_eq!(hidden.dims(), [2, 5, DIM]);

        let values = hidden.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_config_mismatch_fails_construction() {
        let result = Synapse::<TestBackend>::new(
            &config().with_embedding_dim(32),
            network(),
            Arc::new(FixedDirectory(Vec::new())),
            Arc::new(ConstantTransport { answers: HashMap::new() }),
            &Default::default(),
        );
        assert!(matches!(
            result,
            Err(SynapseError::ConfigMismatch { field: "embedding_dim", expected: DIM, actual: 32 })
        ));
    }

    #[test]
    fn test_out_of_vocabulary_token_rejected() {
        let s = synapse(&[], &[]);
        let batch = TokenBatch::from_rows(vec![vec![1, VOCAB as u32]]).unwrap();
        assert!(matches!(s.forward_text(&batch), Err(SynapseError::InvalidTokens { .. })));
    }

    #[test]
    fn test_overlong_sequence_rejected() {
        let s = synapse(&[], &[]);
        let batch = TokenBatch::from_rows(vec![vec![1; 17]]).unwrap();
        assert!(matches!(s.forward_text(&batch), Err(SynapseError::InvalidTokens { .. })));
    }

    #[tokio::test]
    async fn test_training_needs_two_positions() {
        let s = synapse(&[], &[]);
        let batch = TokenBatch::from_rows(vec![vec![1], vec![2]]).unwrap();
        assert!(matches!(
            s.forward(&batch, true, false).await,
            Err(SynapseError::ShapeMismatch { .. })
        ));
        // Inference on a single token is fine.
        assert!(s.forward(&batch, false, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_only_training() {
        let s = synapse(&[1, 2], &[(1, 0.5), (2, -0.5)]);
        let result = s.forward(&tokens(), true, false).await.unwrap();

        assert_eq!(result.remote, RemoteOutcome::NotRequested);
        assert!(result.remote_hidden.is_none());
        assert!(result.distillation_loss.is_none());
        let local = result.local_target_loss.as_ref().expect("local loss computed");
        assert_eq!(result.local_target_logits.as_ref().map(|l| l.dims()), Some([2, 5, VOCAB]));
        assert!((value(&result.loss) - value(local)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_task_losses_without_training() {
        let s = synapse(&[1, 2], &[(1, 0.5), (2, -0.5)]);
        let result = s.forward(&tokens(), false, true).await.unwrap();

        assert!(result.local_target_loss.is_none());
        assert!(result.remote_target_loss.is_none());
        assert!(result.local_target_logits.is_none());
        assert!(result.remote_target_logits.is_none());
        // The remote path itself still ran.
        assert!(result.remote_hidden.is_some());
        let distill = result.distillation_loss.as_ref().expect("distillation computed");
        assert!((value(&result.loss) - value(distill)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_zero_responders_falls_back_to_local() {
        // Three peers in the directory, none answer.
        let s = synapse(&[1, 2, 3], &[]);

        let remote = s.forward(&tokens(), true, true).await.unwrap();
        let local  = s.forward(&tokens(), true, false).await.unwrap();

        assert!(matches!(remote.remote, RemoteOutcome::Skipped { .. }));
        assert!(remote.remote_hidden.is_none());
        assert!(remote.remote_target_loss.is_none());
        assert!(remote.distillation_loss.is_none());
        assert!((value(&remote.loss) - value(&local.loss)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_directory_falls_back_to_local() {
        let s = synapse(&[], &[]);
        let result = s.forward(&tokens(), true, true).await.unwrap();
        assert!(matches!(result.remote, RemoteOutcome::Skipped { .. }));
        assert!(result.local_target_loss.is_some());
    }

    #[tokio::test]
    async fn test_partial_response_joins_remote_path() {
        let s = synapse(&[1, 2, 3, 4], &[(2, 0.25), (4, -0.75)]);
        let result = s.forward(&tokens(), true, true).await.unwrap();

        // Four peers, top_k 3: at least one of the two answering peers is selected.
        match result.remote {
            RemoteOutcome::Joined { queried, responded } => {
                assert_eq!(queried, 3);
                assert!((1..=2).contains(&responded));
            }
            ref other => panic!("expected remote path to join, got {other:?}"),
        }
        assert_eq!(result.remote_hidden.as_ref().map(|h| h.dims()), Some([2, 5, DIM]));

        let local   = value(result.local_target_loss.as_ref().unwrap());
        let remote  = value(result.remote_target_loss.as_ref().unwrap());
        let distill = value(result.distillation_loss.as_ref().unwrap());
        assert!((value(&result.loss) - (local + remote + distill)).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_distillation_only_trains_the_student() {
        let s = synapse(&[1, 2], &[(1, 0.5), (2, -0.5)]);
        // Not training: the loss is the distillation term alone.
        let result = s.forward(&tokens(), false, true).await.unwrap();
        let grads  = result.loss.backward();

        let model = s.model();
        assert!(model.context_encoder.token_embedding.weight.val().grad(&grads).is_some());
        // The remote context is detached, so nothing upstream of it learns.
        assert!(model.router.query.weight.val().grad(&grads).is_none());
        assert!(model.pooler.dense.weight.val().grad(&grads).is_none());
    }

    #[tokio::test]
    async fn test_remote_task_loss_trains_the_router() {
        let s = synapse(&[1, 2], &[(1, 0.5), (2, -0.5)]);
        let result = s.forward(&tokens(), true, true).await.unwrap();
        let grads  = result.loss.backward();

        assert!(s.model().router.query.weight.val().grad(&grads).is_some());
        assert!(s.model().hidden_layer.projection.weight.val().grad(&grads).is_some());
    }

    #[tokio::test]
    async fn test_forward_does_not_mutate_parameters() {
        let s = synapse(&[1], &[(1, 1.0)]);
        let before = s.forward_text(&tokens()).unwrap();
        let _ = s.forward(&tokens(), true, true).await.unwrap();
        let after = s.forward_text(&tokens()).unwrap();

        let diff = (before - after).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-6);
    }
}
