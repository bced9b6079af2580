// ============================================================
// Layer 4 — Token Batcher
// ============================================================
// Turns domain values into tensors on the model's device:
//
//   TokenBatch       → Tensor<B, 2, Int>  [batch, seq_len]
//   RemoteEmbedding  → Tensor<B, 3>       [batch, seq_len, dim]
//
// Both domain types are already flat and row-major, so each
// conversion is one 1D tensor followed by a reshape. Burn uses
// i32 for Int tensor construction, so token ids are narrowed
// here (the synapse has already checked them against the
// vocabulary size).
//
// Reference: Burn Book §4 (Batcher)

use burn::prelude::*;

use crate::domain::{peer::RemoteEmbedding, token_batch::TokenBatch};

/// Holds the target device so tensors are created where the
/// model lives.
#[derive(Clone, Debug)]
pub struct TokenBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> TokenBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// [batch, seq_len] token ids.
    pub fn tokens(&self, batch: &TokenBatch) -> Tensor<B, 2, Int> {
        let flat: Vec<i32> = batch.ids().iter().map(|&id| id as i32).collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape(batch.dims())
    }

    /// [batch, seq_len, dim] context from a validated peer response.
    ///
    /// The result is a leaf with no gradient history: the local
    /// node does not own the peer's computation.
    pub fn embedding(&self, embedding: &RemoteEmbedding) -> Tensor<B, 3> {
        Tensor::<B, 1>::from_floats(embedding.values.as_slice(), &self.device)
            .reshape(embedding.shape)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_tokens_keep_row_order() {
        let batcher = TokenBatcher::<TestBackend>::new(Default::default());
        let batch   = TokenBatch::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();

        let tensor = batcher.tokens(&batch);
        assert_eq!(tensor.dims(), [2, 3]);

        let row1: Vec<i64> = tensor
            .slice([1..2, 0..3])
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(row1, vec![4, 5, 6]);
    }

    #[test]
    fn test_embedding_reshaped_to_declared_shape() {
        let batcher = TokenBatcher::<TestBackend>::new(Default::default());
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let tensor = batcher.embedding(&RemoteEmbedding::new([1, 3, 4], values));

        assert_eq!(tensor.dims(), [1, 3, 4]);
        let last = tensor.slice([0..1, 2..3, 3..4]).into_scalar().elem::<f32>();
        assert_eq!(last, 11.0);
    }
}
