// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Every burn Module and the forward pass live here.
// The domain layer stays free of tensors so that peers,
// token batches and errors can be tested without a backend.
//
// What's in this layer:
//
//   config.rs    — SynapseConfig and its validation against
//                  the network parameters
//
//   encoder.rs   — Causal transformer encoder (used twice:
//                  main encoder and local context student)
//
//   pooler.rs    — [batch, seq, d] → [batch, d] summary that
//                  the router scores peers with
//
//   router.rs    — Product-key peer scoring, top-k selection
//                  and score-weighted combination of answers
//
//   dispatch.rs  — Concurrent fan-out to the selected peers
//                  with a per-request timeout
//
//   fusion.rs    — Joins an encoding with a context
//
//   head.rs      — Vocabulary projection and next-token loss
//
//   loss.rs      — Distillation loss and the loss composer
//
//   synapse.rs   — The forward pass that ties it all together
//
// Reference: Burn Book §3 (Building Blocks)
//            Radford et al. (2019) GPT-2
//            Lample et al. (2019) Product-Key Memory

pub mod config;

/// Causal transformer encoder
pub mod encoder;

pub mod pooler;

/// Peer scoring, selection and aggregation
pub mod router;

/// Concurrent peer requests with timeouts
pub mod dispatch;

pub mod fusion;

pub mod head;

pub mod loss;

/// The synapse forward pass
pub mod synapse;
