// ============================================================
// Layer 5 — Pooler
// ============================================================
// Reduces a sequence of embeddings to one summary vector per
// batch element, which the router uses to score peers:
//
//   hidden [batch, seq, d] ─► hidden[:, 0] ─► Linear ─► tanh ─► [batch, d]
//
// Only position 0 is read, so the cost does not grow with the
// sequence length, and tanh keeps every routing input in
// [-1, 1].

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

#[derive(Config, Debug)]
pub struct PoolerConfig {
    pub d_model: usize,
}

impl PoolerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Pooler<B> {
        Pooler { dense: LinearConfig::new(self.d_model, self.d_model).init(device) }
    }
}

#[derive(Module, Debug)]
pub struct Pooler<B: Backend> {
    pub dense: Linear<B>,
}

impl<B: Backend> Pooler<B> {
    /// hidden: [batch, seq, d] → [batch, d]
    pub fn pool(&self, hidden: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, _, d_model] = hidden.dims();
        let first_token = hidden
            .slice([0..batch_size, 0..1, 0..d_model])
            .reshape([batch_size, d_model]);
        activation::tanh(self.dense.forward(first_token))
    }
}
