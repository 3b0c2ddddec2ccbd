// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load samples, either
//             raw JSONL  → tokenizer → label synthesis   (Layer 4, 6)
//             prepared   → saved tokenizer + records     (Layer 4, 6)
//   Step 2: Record num_classes from the tokenizer        (Layer 6)
//   Step 3: Split train/validation                       (Layer 4)
//   Step 4: Build datasets                               (Layer 4)
//   Step 5: Save config                                  (Layer 6)
//   Step 6: Run training loop                            (Layer 5)

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::{
    dataset::{MlmDataset, MlmSample, SampleBuilder},
    label_synthesis::MAX_PREDICTIONS_PER_SEQ,
    loader::{load_feature_records, JsonlLoader},
    splitter::split_train_val,
};
use crate::domain::traits::ExampleSource;
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{num_classes, TokenizerStore},
};
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Saved as
// train_config.json and reloaded by `predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Raw pre-masked examples (JSONL)
    pub data_path:       String,
    /// Features written by `prepare`; used instead of data_path when set
    #[serde(default)]
    pub prepared_path:   Option<String>,
    pub checkpoint_dir:  String,
    /// Task name; namespaces the label keys and the registered loss
    pub problem:         String,
    pub max_seq_len:     usize,
    pub max_predictions: usize,
    pub batch_size:      usize,
    pub epochs:          usize,
    pub lr:              f64,
    pub d_model:         usize,
    pub embedding_size:  usize,
    pub num_heads:       usize,
    pub num_layers:      usize,
    pub d_ff:            usize,
    pub dropout:         f64,
    /// Upper bound for the tokenizer built from the corpus
    pub vocab_size:      usize,
    /// Output classes of the head, taken from the tokenizer
    #[serde(default)]
    pub num_classes:     usize,
    pub share_embedding: bool,
    pub train_fraction:  f64,
    pub seed:            u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:       "data/train.jsonl".to_string(),
            prepared_path:   None,
            checkpoint_dir:  "checkpoints".to_string(),
            problem:         "mlm".to_string(),
            max_seq_len:     128,
            max_predictions: MAX_PREDICTIONS_PER_SEQ,
            batch_size:      8,
            epochs:          10,
            lr:              2e-4,
            d_model:         256,
            embedding_size:  256,
            num_heads:       8,
            num_layers:      6,
            d_ff:            1024,
            dropout:         0.1,
            vocab_size:      30522,
            num_classes:     30522,
            share_embedding: true,
            train_fraction:  0.8,
            seed:            42,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let mut cfg = self.config.clone();
        ensure!(
            cfg.d_model % cfg.num_heads == 0,
            "d_model ({}) must be divisible by num_heads ({})",
            cfg.d_model,
            cfg.num_heads
        );

        // ── Steps 1-2: Samples and label encoder ──────────────────────────────
        let (tokenizer, samples) = self.load_samples()?;
        cfg.num_classes = num_classes(&tokenizer);
        tracing::info!("Built {} samples, {} classes", samples.len(), cfg.num_classes);
        ensure!(!samples.is_empty(), "No text examples to train on");

        // ── Step 3: Train / validation split ─────────────────────────────────
        let (train_samples, val_samples) =
            split_train_val(samples, cfg.train_fraction, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 4: Burn datasets ─────────────────────────────────────────────
        let train_dataset = MlmDataset::new(train_samples);
        let val_dataset   = MlmDataset::new(val_samples);
        tracing::debug!(
            "Datasets: {} train, {} validation samples",
            train_dataset.sample_count(),
            val_dataset.sample_count()
        );

        // ── Step 5: Save config for inference ─────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(&cfg)?;

        // ── Step 6: Run training loop (Layer 5) ───────────────────────────────
        run_training(&cfg, train_dataset, val_dataset, ckpt_manager)
    }

    /// Tokenizer plus samples, from prepared features when a path is
    /// configured and from the raw examples otherwise.
    pub fn load_samples(&self) -> Result<(Tokenizer, Vec<MlmSample>)> {
        let cfg       = &self.config;
        let tok_store = TokenizerStore::new(&cfg.checkpoint_dir);

        if let Some(prepared) = &cfg.prepared_path {
            let tokenizer = tok_store.load()?;
            let mut samples = Vec::new();
            for (line, record) in load_feature_records(prepared)?.into_iter().enumerate() {
                if let Some(sample) = record.into_sample(&cfg.problem)? {
                    // the file may have been prepared with other limits
                    sample
                        .check_shape(cfg.max_seq_len, cfg.max_predictions)
                        .with_context(|| format!("Prepared record {} in '{}'", line + 1, prepared))?;
                    samples.push(sample);
                }
            }
            return Ok((tokenizer, samples));
        }

        tracing::info!("Loading examples from '{}'", cfg.data_path);
        let examples  = JsonlLoader::new(&cfg.data_path).load_all()?;
        let texts     = corpus_texts(&examples);
        let tokenizer = tok_store.load_or_build(&texts, cfg.vocab_size)?;

        let samples = SampleBuilder::new(&tokenizer, cfg.max_seq_len, cfg.max_predictions)?
            .build_all(&examples)?;
        Ok((tokenizer, samples))
    }
}

/// Inputs and targets of every example, for vocabulary building.
pub fn corpus_texts(examples: &[crate::domain::example::PremaskedExample]) -> Vec<String> {
    examples
        .iter()
        .flat_map(|ex| [ex.inputs.clone(), ex.target.clone()])
        .collect()
}
