// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Subcommands: `train`, `prepare` and `predict`.
// `train` and `prepare` share the corpus/tokenizer flags so a
// prepared file and a raw run see the same settings.

use clap::{Args, Subcommand};
use crate::application::train_use_case::TrainConfig;
use crate::data::label_synthesis::MAX_PREDICTIONS_PER_SEQ;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the masked LM on pre-masked JSONL examples
    Train(TrainArgs),

    /// Synthesize masked LM labels and write them as JSONL features
    Prepare(PrepareArgs),

    /// Fill [MASK] tokens in a text using a trained checkpoint
    Predict(PredictArgs),
}

/// Flags shared by `train` and `prepare`.
#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    /// JSONL file of {"inputs", "target", "modality"} records
    #[arg(long, default_value = "data/train.jsonl")]
    pub data_path: String,

    /// Directory for checkpoints, tokenizer and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Task name used to namespace label keys and the loss
    #[arg(long, default_value = "mlm")]
    pub problem: String,

    /// Maximum number of tokens per input sequence, [CLS] and [SEP] included
    #[arg(long, default_value_t = 128)]
    pub max_seq_len: usize,

    /// Label slots per example; masks beyond this are dropped
    #[arg(long, default_value_t = MAX_PREDICTIONS_PER_SEQ)]
    pub max_predictions: usize,

    /// Upper bound on the tokenizer vocabulary built from the corpus
    #[arg(long, default_value_t = 30522)]
    pub vocab_size: usize,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Train from a features file written by `prepare`
    #[arg(long)]
    pub prepared: Option<String>,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 2e-4)]
    pub lr: f64,

    /// Hidden size of the encoder; must be divisible by num_heads
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// Width of the token-embedding table; tying needs it equal to d_model
    #[arg(long, default_value_t = 256)]
    pub embedding_size: usize,

    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    /// Inner dimension of the feed-forward network
    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Use an independent output projection instead of the embedding table
    #[arg(long)]
    pub no_share_embedding: bool,

    /// Fraction of samples used for training, the rest validates
    #[arg(long, default_value_t = 0.8)]
    pub train_fraction: f64,

    /// Seed for the train/validation shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            prepared_path:   a.prepared,
            batch_size:      a.batch_size,
            epochs:          a.epochs,
            lr:              a.lr,
            d_model:         a.d_model,
            embedding_size:  a.embedding_size,
            num_heads:       a.num_heads,
            num_layers:      a.num_layers,
            d_ff:            a.d_ff,
            dropout:         a.dropout,
            share_embedding: !a.no_share_embedding,
            train_fraction:  a.train_fraction,
            seed:            a.seed,
            ..TrainConfig::from(a.corpus)
        }
    }
}

impl From<CorpusArgs> for TrainConfig {
    fn from(c: CorpusArgs) -> Self {
        TrainConfig {
            data_path:       c.data_path,
            checkpoint_dir:  c.checkpoint_dir,
            problem:         c.problem,
            max_seq_len:     c.max_seq_len,
            max_predictions: c.max_predictions,
            vocab_size:      c.vocab_size,
            num_classes:     c.vocab_size,
            ..TrainConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Where to write the features JSONL
    #[arg(long, default_value = "data/features.jsonl")]
    pub output: String,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Text containing one or more [MASK] tokens
    #[arg(long)]
    pub text: String,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Number of candidates shown per mask
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_reach_config() {
        let cli = Cli::try_parse_from([
            "premask-mlm", "train",
            "--problem", "wiki",
            "--max-predictions", "5",
            "--embedding-size", "128",
            "--no-share-embedding",
        ])
        .unwrap();

        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.problem, "wiki");
        assert_eq!(cfg.max_predictions, 5);
        assert_eq!(cfg.embedding_size, 128);
        assert!(!cfg.share_embedding);
        assert!(cfg.prepared_path.is_none());
    }

    #[test]
    fn test_default_max_predictions() {
        let cli = Cli::try_parse_from(["premask-mlm", "prepare"]).unwrap();
        let Commands::Prepare(args) = cli.command else { panic!("expected prepare") };
        assert_eq!(args.corpus.max_predictions, 20);
        assert_eq!(args.output, "data/features.jsonl");
    }

    #[test]
    fn test_predict_requires_text() {
        assert!(Cli::try_parse_from(["premask-mlm", "predict"]).is_err());
    }
}
