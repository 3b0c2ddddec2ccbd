// ============================================================
// Layer 5 — Premask MLM Model
// ============================================================
// Wires the text encoder to the masked LM head:
//
//   input_ids, attention_mask
//        │
//        ▼
//   TextEncoder       → HiddenFeatures { seq [b, s, h] }
//        │
//        ▼
//   MaskedLmHead      → probabilities, loss in LossRegistry
//
// The encoder owns the token-embedding table. A tied head is
// handed `&encoder.token_embedding` on each call.

use anyhow::Result;
use burn::prelude::*;

use crate::application::train_use_case::TrainConfig;
use crate::data::batcher::MlmBatch;
use crate::domain::mode::Mode;
use crate::ml::encoder::{TextEncoder, TextEncoderConfig};
use crate::ml::head::{MaskedLmHead, MaskedLmHeadConfig, MaskedLmTargets};
use crate::ml::loss::LossRegistry;

#[derive(Config, Debug)]
pub struct PremaskMlmConfig {
    pub encoder: TextEncoderConfig,
    /// Task name the head registers its loss under
    pub problem: String,
    /// Tie the output projection to the token-embedding table
    #[config(default = true)]
    pub share_embedding: bool,
}

impl PremaskMlmConfig {
    /// Model architecture for a training run. `num_classes` is the
    /// tokenizer's vocabulary size recorded at preparation time.
    pub fn from_train_config(cfg: &TrainConfig) -> Self {
        let encoder = TextEncoderConfig::new(
            cfg.num_classes, cfg.max_seq_len, cfg.d_model, cfg.embedding_size,
            cfg.num_heads, cfg.num_layers, cfg.d_ff, cfg.dropout,
        );
        Self::new(encoder, cfg.problem.clone()).with_share_embedding(cfg.share_embedding)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PremaskMlmModel<B> {
        let encoder = self.encoder.init(device);
        let head = MaskedLmHeadConfig::new(
            self.problem.clone(),
            self.encoder.d_model,
            self.encoder.vocab_size,
        )
        .with_share_embedding(self.share_embedding)
        .init(device, Some(&encoder.token_embedding));
        PremaskMlmModel { encoder, head }
    }
}

/// Encoder plus masked LM head. The head borrows the encoder's
/// embedding table on every forward pass.
#[derive(Module, Debug)]
pub struct PremaskMlmModel<B: Backend> {
    pub encoder: TextEncoder<B>,
    pub head:    MaskedLmHead<B>,
}

impl<B: Backend> PremaskMlmModel<B> {
    /// Encode, then run the head in `mode`. `targets` is required
    /// in Train and Eval.
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        targets:        Option<&MaskedLmTargets<B>>,
        mode:           Mode,
        losses:         &mut LossRegistry<B>,
    ) -> Result<Tensor<B, 3>> {
        let features = self.encoder.forward(input_ids, attention_mask);
        self.head
            .forward(features, targets, mode, &self.encoder.token_embedding, losses)
    }

    /// `forward` over a stacked batch, with its labels as targets.
    pub fn forward_batch(
        &self,
        batch:  &MlmBatch<B>,
        mode:   Mode,
        losses: &mut LossRegistry<B>,
    ) -> Result<Tensor<B, 3>> {
        self.forward(
            batch.input_ids.clone(),
            batch.attention_mask.clone(),
            Some(&batch.targets),
            mode,
            losses,
        )
    }
}
