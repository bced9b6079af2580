// ============================================================
// Layer 2 — Infer Use Case
// ============================================================
// Local-only inference on one token batch:
//
//   Step 1: Load node settings         (Layer 6 - infra)
//   Step 2: Parse the token batch      (Layer 3 - domain)
//   Step 3: Build the synapse          (Layer 5 - ml)
//   Step 4: forward_text()             (Layer 5 - ml)
//   Step 5: Summarise the hidden state
//
// No peers are contacted, so the synapse is built with an
// empty directory and a transport with no peers behind it.

use std::sync::Arc;

use anyhow::{Context, Result};
use burn::prelude::*;

use crate::domain::token_batch::TokenBatch;
use crate::infra::{
    settings::{NodeSettings, SettingsStore},
    simulated::SimulatedTransport,
    static_directory::StaticPeerDirectory,
};
use crate::ml::synapse::Synapse;

type InferBackend = burn::backend::Wgpu;

#[derive(Debug, Clone)]
pub struct InferConfig {
    pub config_path: String,
    pub tokens:      String,
}

/// Shape and summary statistics of the local hidden state.
#[derive(Debug, Clone, PartialEq)]
pub struct InferReport {
    pub shape: [usize; 3],
    pub mean:  f32,
    pub std:   f32,
    pub min:   f32,
    pub max:   f32,
}

pub struct InferUseCase {
    config: InferConfig,
}

impl InferUseCase {
    pub fn new(config: InferConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<InferReport> {
        let settings = SettingsStore::new(&self.config.config_path).load_or_default()?;
        let tokens   = TokenBatch::parse(&self.config.tokens).context("Cannot parse --tokens")?;

        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        infer::<InferBackend>(&settings, &tokens, &device)
    }
}

/// Run forward_text on any backend and summarise the output.
pub fn infer<B: Backend>(
    settings: &NodeSettings,
    tokens:   &TokenBatch,
    device:   &B::Device,
) -> Result<InferReport> {
    let synapse = Synapse::<B>::new(
        &settings.synapse,
        settings.network,
        Arc::new(StaticPeerDirectory::default()),
        Arc::new(SimulatedTransport::new(Vec::new())),
        device,
    )
    .context("Cannot build synapse from settings")?;

    let hidden = synapse.forward_text(tokens)?;
    let shape  = hidden.dims();
    let values = hidden
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read hidden state: {e:?}"))?;

    Ok(summarise(shape, &values))
}

fn summarise(shape: [usize; 3], values: &[f32]) -> InferReport {
    let n    = values.len().max(1) as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var  = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let min  = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max  = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    InferReport { shape, mean, std: var.sqrt(), min, max }
}
