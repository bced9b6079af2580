// ============================================================
// Layer 4 — Data Boundary
// ============================================================
// The one place where domain values become tensors:
//
//   TokenBatch  (caller)   ─┐
//                           ├─► TokenBatcher ─► Tensor<B, _>
//   RemoteEmbedding (peer) ─┘
//
// Tokenisation itself happens outside this node; batches
// arrive here already as token ids.
//
// Reference: Burn Book §4 (Batcher)

/// Converts token batches and peer embeddings into tensors
pub mod batcher;
