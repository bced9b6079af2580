// ============================================================
// Layer 5 — Task Head
// ============================================================
// Projects hidden states onto the vocabulary and scores them
// with the standard causal language-model loss:
//
//   logits[:, :-1]  predicts  tokens[:, 1:]
//
// flattened to (batch · (seq − 1)) rows of `vocab` classes and
// averaged with cross-entropy. Like the fusion layer, one head
// serves both the local and the remote hidden states.
//
// Reference: Burn Book §3 (Loss Functions)

use burn::{
    nn::{loss::CrossEntropyLossConfig, Linear, LinearConfig},
    prelude::*,
};

use crate::domain::error::{SynapseError, SynapseResult};

#[derive(Config, Debug)]
pub struct TaskHeadConfig {
    pub d_model:    usize,
    pub vocab_size: usize,
}

impl TaskHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TaskHead<B> {
        TaskHead {
            projection: LinearConfig::new(self.d_model, self.vocab_size)
                .with_bias(false)
                .init(device),
            d_model: self.d_model,
        }
    }
}

#[derive(Module, Debug)]
pub struct TaskHead<B: Backend> {
    pub projection: Linear<B>,
    pub d_model:    usize,
}

impl<B: Backend> TaskHead<B> {
    /// hidden: [batch, seq, d_model] → [batch, seq, vocab]
    pub fn logits(&self, hidden: Tensor<B, 3>) -> SynapseResult<Tensor<B, 3>> {
        let dims = hidden.dims();
        if dims[2] != self.d_model {
            return Err(SynapseError::ShapeMismatch {
                context:  "task head",
                expected: vec![dims[0], dims[1], self.d_model],
                actual:   dims.to_vec(),
            });
        }
        Ok(self.projection.forward(hidden))
    }
}

/// Mean next-token cross-entropy of `logits` against `tokens`.
///
/// logits: [batch, seq, vocab], tokens: [batch, seq], seq >= 2.
pub fn next_token_loss<B: Backend>(
    logits: Tensor<B, 3>,
    tokens: Tensor<B, 2, Int>,
) -> SynapseResult<Tensor<B, 1>> {
    let [batch_size, seq_len, vocab] = logits.dims();
    let token_dims = tokens.dims();
    if token_dims != [batch_size, seq_len] {
        return Err(SynapseError::ShapeMismatch {
            context:  "next-token loss",
            expected: vec![batch_size, seq_len],
            actual:   token_dims.to_vec(),
        });
    }
    if seq_len < 2 {
        return Err(SynapseError::ShapeMismatch {
            context:  "next-token loss (needs seq_len >= 2)",
            expected: vec![batch_size, 2],
            actual:   token_dims.to_vec(),
        });
    }

    let positions    = batch_size * (seq_len - 1);
    let shift_logits = logits
        .slice([0..batch_size, 0..seq_len - 1, 0..vocab])
        .reshape([positions, vocab]);
    let shift_labels = tokens
        .slice([0..batch_size, 1..seq_len])
        .reshape([positions]);

    let ce = CrossEntropyLossConfig::new().init(&shift_logits.device());
    Ok(ce.forward(shift_logits, shift_labels))
}
