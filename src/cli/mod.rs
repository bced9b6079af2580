// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `init-config` — writes default node settings
//   2. `infer`       — local-only forward pass on a token batch
//   3. `step`        — one training step with simulated peers
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, InferArgs, InitConfigArgs, StepArgs};

use crate::ml::synapse::RemoteOutcome;

#[derive(Parser, Debug)]
#[command(
    name = "synapse-node",
    version = "0.1.0",
    about = "A synapse node: local transformer encoder plus routed remote context from peers."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case. Printing happens
    /// here and nowhere else.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::InitConfig(args) => run_init_config(args),
            Commands::Infer(args)      => run_infer(args),
            Commands::Step(args)       => run_step(args).await,
        }
    }
}

fn run_init_config(args: InitConfigArgs) -> Result<()> {
    use crate::infra::{
        settings::{NodeSettings, SettingsStore},
        simulated::PeerFile,
    };

    let settings = NodeSettings::default();
    SettingsStore::new(&args.out).save(&settings)?;
    println!("Wrote default settings to '{}'", args.out);

    if let Some(path) = args.peers_out {
        PeerFile::sample(&settings.network, settings.synapse.max_seq_len).save(&path)?;
        println!("Wrote sample peers to '{}'", path);
    }
    Ok(())
}

fn run_infer(args: InferArgs) -> Result<()> {
    use crate::application::infer_use_case::InferUseCase;

    let report = InferUseCase::new(args.into()).execute()?;
    println!("hidden shape: {:?}", report.shape);
    println!("mean {:.6}  std {:.6}  min {:.6}  max {:.6}", report.mean, report.std, report.min, report.max);
    Ok(())
}

async fn run_step(args: StepArgs) -> Result<()> {
    use crate::application::step_use_case::StepUseCase;

    tracing::info!("Running one step with lr={}", args.lr);
    let report = StepUseCase::new(args.into()).execute().await?;

    match &report.remote {
        RemoteOutcome::NotRequested => println!("remote path: not requested"),
        RemoteOutcome::Skipped { reason } => println!("remote path: skipped ({reason})"),
        RemoteOutcome::Joined { queried, responded } => {
            println!("remote path: {responded} of {queried} peers responded")
        }
    }
    println!("local target loss:  {}", term(report.local_target_loss));
    println!("remote target loss: {}", term(report.remote_target_loss));
    println!("distillation loss:  {}", term(report.distillation_loss));
    println!("total loss:         {:.6}", report.loss);
    println!("local loss after:   {:.6}", report.local_loss_after);
    Ok(())
}

fn term(value: Option<f32>) -> String {
    value.map_or_else(|| "not computed".to_string(), |v| format!("{v:.6}"))
}
