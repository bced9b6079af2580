// ============================================================
// Layer 5 — Loss Composer
// ============================================================
// Builds the single scalar the trainer back-propagates:
//
//   loss = local_target_loss      (if training)
//        + remote_target_loss     (if training and remote joined)
//        + distillation_loss      (if remote joined)
//
// Terms are added in exactly that order, each one only if it
// was computed, and each is checked for NaN/Inf before it is
// added. With no terms the total is a finite zero.
//
// Distillation is MSE between the local student context and a
// detached copy of the remote context. Gradients from it reach
// the student encoder only, never the remote tensor.

use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
};

use crate::domain::error::{SynapseError, SynapseResult};

/// MSE(local_context, stop_gradient(remote_context)).
pub fn distillation_loss<B: Backend>(
    local_context:  Tensor<B, 3>,
    remote_context: Tensor<B, 3>,
) -> Tensor<B, 1> {
    MseLoss::new().forward(local_context, remote_context.detach(), Reduction::Mean)
}

/// Fail with `NumericInstability` unless `value` is finite.
pub fn ensure_finite<B: Backend>(term: &'static str, value: &Tensor<B, 1>) -> SynapseResult<f32> {
    let scalar = value.clone().sum().into_scalar().elem::<f32>();
    if scalar.is_finite() {
        Ok(scalar)
    } else {
        Err(SynapseError::NumericInstability { term, value: scalar })
    }
}

/// The three optional loss terms in their fixed order.
#[derive(Debug, Clone)]
pub struct LossComposer<B: Backend> {
    local_target:  Option<Tensor<B, 1>>,
    remote_target: Option<Tensor<B, 1>>,
    distillation:  Option<Tensor<B, 1>>,
}

impl<B: Backend> Default for LossComposer<B> {
    fn default() -> Self {
        Self { local_target: None, remote_target: None, distillation: None }
    }
}

impl<B: Backend> LossComposer<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_target(mut self, loss: Option<Tensor<B, 1>>) -> Self {
        self.local_target = loss;
        self
    }

    pub fn with_remote_target(mut self, loss: Option<Tensor<B, 1>>) -> Self {
        self.remote_target = loss;
        self
    }

    pub fn with_distillation(mut self, loss: Option<Tensor<B, 1>>) -> Self {
        self.distillation = loss;
        self
    }

    /// Sum of the present terms: local, then remote, then distillation.
    pub fn compose(&self, device: &B::Device) -> SynapseResult<Tensor<B, 1>> {
        let terms = [
            ("local target loss", &self.local_target),
            ("remote target loss", &self.remote_target),
            ("distillation loss", &self.distillation),
        ];

        let mut total = Tensor::<B, 1>::zeros([1], device);
        for (name, term) in terms {
            if let Some(value) = term {
                ensure_finite(name, value)?;
                total = total + value.clone();
            }
        }
        ensure_finite("total loss", &total)?;
        Ok(total)
    }
}
