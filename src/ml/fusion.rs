// ============================================================
// Layer 5 — Fusion Layer
// ============================================================
// Joins an encoder's base embedding with a context embedding:
//
//   [batch, seq, d] ⊕ [batch, seq, d] ─► [batch, seq, 2d] ─► Linear ─► [batch, seq, d]
//
// The synapse owns exactly one FusionLayer and calls it for
// the local context and again for the remote context, so both
// hidden representations live in the same space.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};

use crate::domain::error::{SynapseError, SynapseResult};

#[derive(Config, Debug)]
pub struct FusionConfig {
    pub d_model: usize,
}

impl FusionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FusionLayer<B> {
        FusionLayer {
            projection: LinearConfig::new(2 * self.d_model, self.d_model).init(device),
            d_model:    self.d_model,
        }
    }
}

#[derive(Module, Debug)]
pub struct FusionLayer<B: Backend> {
    pub projection: Linear<B>,
    pub d_model:    usize,
}

impl<B: Backend> FusionLayer<B> {
    /// Both inputs must be [batch, seq, d_model].
    pub fn fuse(&self, base: Tensor<B, 3>, context: Tensor<B, 3>) -> SynapseResult<Tensor<B, 3>> {
        let base_dims    = base.dims();
        let context_dims = context.dims();
        if base_dims != context_dims {
            return Err(SynapseError::ShapeMismatch {
                context:  "fusion",
                expected: base_dims.to_vec(),
                actual:   context_dims.to_vec(),
            });
        }
        if base_dims[2] != self.d_model {
            return Err(SynapseError::ShapeMismatch {
                context:  "fusion",
                expected: vec![base_dims[0], base_dims[1], self.d_model],
                actual:   base_dims.to_vec(),
            });
        }
        Ok(self.projection.forward(Tensor::cat(vec![base, context], 2)))
    }
}
