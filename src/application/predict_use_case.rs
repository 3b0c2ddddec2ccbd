// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Loads the saved tokenizer and the latest checkpoint, then
// fills the [MASK] slots of a text with the head's
// prediction-mode distribution.

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::infra::{checkpoint::CheckpointManager, tokenizer_store::TokenizerStore};
use crate::ml::inferencer::{fill_masks, Inferencer, MaskPrediction};

pub struct PredictUseCase {
    tokenizer:  Tokenizer,
    inferencer: Inferencer,
}

/// Ranked candidates per slot plus the text with the best
/// candidate filled in.
#[derive(Debug, Clone)]
pub struct FilledText {
    pub predictions: Vec<MaskPrediction>,
    pub filled:      String,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: &str) -> Result<Self> {
        let tokenizer  = TokenizerStore::new(checkpoint_dir).load()?;
        let ckpt       = CheckpointManager::new(checkpoint_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt)?;
        Ok(Self { tokenizer, inferencer })
    }

    pub fn predict(&self, text: &str, top_k: usize) -> Result<FilledText> {
        let predictions = self.inferencer.predict(text, &self.tokenizer, top_k.max(1))?;
        if predictions.is_empty() {
            tracing::warn!("No [MASK] token within the model's sequence length");
        }

        let best: Vec<&str> = predictions.iter().filter_map(|p| p.best()).collect();
        let filled = fill_masks(text, &best);
        Ok(FilledText { predictions, filled })
    }
}
