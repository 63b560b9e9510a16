// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and routes to a use case.
//
//   1. `train`   — pretrain on a JSONL dataset of X-ray/report pairs
//   2. `preview` — print assembled samples as JSON
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PreviewArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "cxr-bert",
    version,
    about = "Multimodal BERT pretraining on chest X-rays and their radiology reports."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Preview(args) => run_preview(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting pretraining on: {}", args.data.data_path);
    TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Checkpoints saved.");
    Ok(())
}

fn run_preview(args: PreviewArgs) -> Result<()> {
    use crate::application::preview_use_case::PreviewUseCase;

    let config = args.data.apply(TrainConfig::default());
    let samples = PreviewUseCase::new(config, args.mode, args.count, args.show_mask).execute()?;

    for sample in samples {
        println!("{}", serde_json::to_string(&sample)?);
    }
    Ok(())
}
