// ============================================================
// Layer 2 — Step Use Case
// ============================================================
// One optimisation step of the synapse against simulated
// peers:
//
//   Step 1: Load node settings and peers file   (Layer 6 - infra)
//   Step 2: Parse the token batch               (Layer 3 - domain)
//   Step 3: Build directory + transport         (Layer 6 - infra)
//   Step 4: forward(training = true, remote)    (Layer 5 - ml)
//   Step 5: Backward pass + Adam update
//   Step 6: Local-only forward with the new parameters
//
// The optimizer is applied through Synapse::map_model(), which
// is only called once the forward pass has returned.
//
// Reference: Burn Book §5 (Training)
//            Kingma & Ba (2015) Adam

use std::sync::Arc;

use anyhow::{Context, Result};
use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::token_batch::TokenBatch;
use crate::infra::{
    settings::{NodeSettings, SettingsStore},
    simulated::{PeerFile, SimulatedTransport},
    static_directory::StaticPeerDirectory,
};
use crate::ml::synapse::{RemoteOutcome, Synapse};

type StepBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

#[derive(Debug, Clone)]
pub struct StepConfig {
    pub config_path: String,
    pub peers_path:  String,
    pub tokens:      String,
    pub remote:      bool,
    pub lr:          f64,
}

/// Every loss term of the step, `None` where it was not computed.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub loss:               f32,
    pub local_target_loss:  Option<f32>,
    pub remote_target_loss: Option<f32>,
    pub distillation_loss:  Option<f32>,
    pub remote:             RemoteOutcome,
    /// Local next-token loss after the update
    pub local_loss_after:   f32,
}

pub struct StepUseCase {
    config: StepConfig,
}

impl StepUseCase {
    pub fn new(config: StepConfig) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> Result<StepReport> {
        let cfg      = &self.config;
        let settings = SettingsStore::new(&cfg.config_path).load_or_default()?;
        let peers    = PeerFile::load(&cfg.peers_path)?;
        let tokens   = TokenBatch::parse(&cfg.tokens).context("Cannot parse --tokens")?;
        tracing::info!("Loaded {} simulated peers from '{}'", peers.peers.len(), cfg.peers_path);

        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        step::<StepBackend>(&settings, &peers, &tokens, cfg.remote, cfg.lr, &device).await
    }
}

/// Forward, backward and one Adam update on any autodiff backend.
pub async fn step<B: AutodiffBackend>(
    settings: &NodeSettings,
    peers:    &PeerFile,
    tokens:   &TokenBatch,
    remote:   bool,
    lr:       f64,
    device:   &B::Device,
) -> Result<StepReport> {
    let synapse = Synapse::<B>::new(
        &settings.synapse,
        settings.network,
        Arc::new(StaticPeerDirectory::new(peers.handles())),
        Arc::new(SimulatedTransport::new(peers.peers.clone())),
        device,
    )
    .context("Cannot build synapse from settings")?;

    // ── Forward ───────────────────────────────────────────────────────────────
    let result = synapse.forward(tokens, true, remote).await?;

    let scalar = |t: &Tensor<B, 1>| t.clone().into_scalar().elem::<f32>();
    let loss               = scalar(&result.loss);
    let local_target_loss  = result.local_target_loss.as_ref().map(scalar);
    let remote_target_loss = result.remote_target_loss.as_ref().map(scalar);
    let distillation_loss  = result.distillation_loss.as_ref().map(scalar);
    let outcome            = result.remote.clone();

    // ── Backward + Adam update ────────────────────────────────────────────────
    let grads     = result.loss.backward();
    let grads     = GradientsParams::from_grads(grads, synapse.model());
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();
    let synapse   = synapse.map_model(|model| optim.step(lr, model, grads));

    // ── Re-evaluate locally ───────────────────────────────────────────────────
    let after = synapse.forward(tokens, true, false).await?;
    let local_loss_after = scalar(&after.loss);

    tracing::info!(loss, local_loss_after, "Step complete");
    Ok(StepReport {
        loss,
        local_target_loss,
        remote_target_loss,
        distillation_loss,
        remote: outcome,
        local_loss_after,
    })
}
