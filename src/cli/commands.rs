// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `init-config`, `infer` and
// `step`, and all their flags.
//
// Token batches are given inline: rows separated by ';',
// ids within a row by ','. Every row must have the same
// length, e.g. --tokens "464,3290,318;2061,318,257".
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{infer_use_case::InferConfig, step_use_case::StepConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write default node settings (and optionally a sample peers file)
    InitConfig(InitConfigArgs),

    /// Run the synapse locally on a token batch
    Infer(InferArgs),

    /// Run one training step against simulated peers
    Step(StepArgs),
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the settings JSON
    #[arg(long, default_value = "node.json")]
    pub out: String,

    /// Also write a sample simulated-peers file here
    #[arg(long)]
    pub peers_out: Option<String>,
}

#[derive(Args, Debug)]
pub struct InferArgs {
    /// Settings JSON (defaults are used if the file is missing)
    #[arg(long, default_value = "node.json")]
    pub config: String,

    /// Token batch, e.g. "1,2,3;4,5,6"
    #[arg(long)]
    pub tokens: String,
}

#[derive(Args, Debug)]
pub struct StepArgs {
    /// Settings JSON (defaults are used if the file is missing)
    #[arg(long, default_value = "node.json")]
    pub config: String,

    /// Simulated peers JSON
    #[arg(long, default_value = "peers.json")]
    pub peers: String,

    /// Token batch, at least two ids per row
    #[arg(long)]
    pub tokens: String,

    /// Skip the remote path entirely
    #[arg(long)]
    pub local_only: bool,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,
}

impl From<InferArgs> for InferConfig {
    fn from(a: InferArgs) -> Self {
        InferConfig {
            config_path: a.config,
            tokens:      a.tokens,
        }
    }
}

impl From<StepArgs> for StepConfig {
    fn from(a: StepArgs) -> Self {
        StepConfig {
            config_path: a.config,
            peers_path:  a.peers,
            tokens:      a.tokens,
            remote:      !a.local_only,
            lr:          a.lr,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::cli::Cli;
    use super::*;

    #[test]
    fn test_step_args_map_to_config() {
        let cli = Cli::try_parse_from([
            "synapse-node", "step", "--tokens", "1,2;3,4", "--local-only", "--lr", "0.01",
        ])
        .unwrap();

        let Commands::Step(args) = cli.command else { panic!("expected step") };
        let config = StepConfig::from(args);
        assert!(!config.remote);
        assert_eq!(config.lr, 0.01);
        assert_eq!(config.peers_path, "peers.json");
        assert_eq!(config.tokens, "1,2;3,4");
    }

    #[test]
    fn test_infer_requires_tokens() {
        assert!(Cli::try_parse_from(["synapse-node", "infer"]).is_err());
    }

    #[test]
    fn test_init_config_defaults() {
        let cli = Cli::try_parse_from(["synapse-node", "init-config"]).unwrap();
        let Commands::InitConfig(args) = cli.command else { panic!("expected init-config") };
        assert_eq!(args.out, "node.json");
        assert!(args.peers_out.is_none());
    }
}
