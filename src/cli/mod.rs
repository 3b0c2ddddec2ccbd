// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes to Layer 2.
//
//   1. `train`   — trains encoder + masked LM head
//   2. `prepare` — writes synthesized label features to JSONL
//   3. `predict` — fills [MASK] tokens with a trained checkpoint

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, PrepareArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "premask-mlm",
    version = "0.1.0",
    about = "Train a masked LM head on pre-masked text, then fill [MASK] tokens."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Prepare(args) => run_prepare(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    match &args.prepared {
        Some(path) => tracing::info!("Starting training on prepared features: {}", path),
        None       => tracing::info!("Starting training on examples in: {}", args.corpus.data_path),
    }

    TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Checkpoint saved.");
    Ok(())
}

fn run_prepare(args: PrepareArgs) -> Result<()> {
    use crate::application::prepare_use_case::PrepareUseCase;

    let summary = PrepareUseCase::new(args.corpus.into(), args.output.clone()).execute()?;
    println!(
        "Wrote {} records ({} with labels) to {}",
        summary.records, summary.labelled, args.output
    );
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(&args.checkpoint_dir)?;
    let result   = use_case.predict(&args.text, args.top_k)?;

    println!("\n{}", result.filled);
    for (slot, prediction) in result.predictions.iter().enumerate() {
        let ranked: Vec<String> = prediction
            .candidates
            .iter()
            .map(|(token, p)| format!("{token} ({:.1}%)", p * 100.0))
            .collect();
        println!("  [MASK] #{} @ {}: {}", slot + 1, prediction.position, ranked.join(", "));
    }
    Ok(())
}
