// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Predict-mode inference from a saved checkpoint:
//
//   text ──encode [CLS] text [SEP]──► input_ids
//        ──model (Mode::Predict)────► probs [1, seq_len, vocab]
//        ──rows at [MASK] ids───────► top-k tokens per slot
//
// Runs on the plain Wgpu backend; no autodiff graph is built.

use anyhow::Result;
use burn::{prelude::*, tensor::TensorData};
use tokenizers::Tokenizer;

use crate::data::dataset::SampleBuilder;
use crate::domain::{example::MASK_TOKEN, mode::Mode, traits::MaskTokenizer};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::loss::LossRegistry;
use crate::ml::model::{PremaskMlmConfig, PremaskMlmModel};

type InferBackend = burn::backend::Wgpu;

/// Candidates for one `[MASK]` slot, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPrediction {
    /// Index into the encoded `[CLS] ... [SEP]` sequence
    pub position:   usize,
    /// (token, probability), highest probability first
    pub candidates: Vec<(String, f32)>,
}

impl MaskPrediction {
    pub fn best(&self) -> Option<&str> {
        self.candidates.first().map(|(token, _)| token.as_str())
    }
}

/// A loaded model plus the sequence limits it was trained with.
pub struct Inferencer {
    model:           PremaskMlmModel<InferBackend>,
    max_seq_len:     usize,
    max_predictions: usize,
    device:          burn::backend::wgpu::WgpuDevice,
}

impl Inferencer {
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager) -> Result<Self> {
        let device    = burn::backend::wgpu::WgpuDevice::default();
        let cfg       = ckpt_manager.load_config()?;
        let model_cfg = PremaskMlmConfig::from_train_config(&cfg);
        let model: PremaskMlmModel<InferBackend> = model_cfg.init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!("Model loaded from checkpoint");
        Ok(Self {
            model,
            max_seq_len:     cfg.max_seq_len,
            max_predictions: cfg.max_predictions,
            device,
        })
    }

    /// Predict the `top_k` most likely tokens for every `[MASK]` in
    /// `text`. Masks beyond the sequence length are not scored.
    pub fn predict(
        &self,
        text:      &str,
        tokenizer: &Tokenizer,
        top_k:     usize,
    ) -> Result<Vec<MaskPrediction>> {
        let builder = SampleBuilder::new(tokenizer, self.max_seq_len, self.max_predictions)?;
        let (input_ids, attention_mask) = builder.encode_inputs(text)?;
        let mask_id = tokenizer.mask_token_id()?;

        let positions: Vec<usize> = input_ids
            .iter()
            .enumerate()
            .filter(|&(_, &id)| id == mask_id)
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let seq_len = input_ids.len();
        let ids  = self.int_tensor(&input_ids);
        let mask = self.int_tensor(&attention_mask);

        let mut losses = LossRegistry::new();
        let probs = self.model.forward(ids, mask, None, Mode::Predict, &mut losses)?;
        let [_, _, vocab] = probs.dims();

        let mut predictions = Vec::with_capacity(positions.len());
        for position in positions {
            let row: Vec<f32> = probs
                .clone()
                .slice([0..1, position..position + 1, 0..vocab])
                .reshape([vocab])
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| anyhow::anyhow!("Cannot read probabilities: {e:?}"))?;

            let candidates = top_k_indices(&row, top_k)
                .into_iter()
                .map(|(id, p)| {
                    let token = tokenizer
                        .id_to_token(id as u32)
                        .unwrap_or_else(|| "[UNK]".to_string());
                    (token, p)
                })
                .collect();
            predictions.push(MaskPrediction { position, candidates });
        }

        tracing::debug!("Scored {} mask slots over {} tokens", predictions.len(), seq_len);
        Ok(predictions)
    }

    fn int_tensor(&self, values: &[u32]) -> Tensor<InferBackend, 2, Int> {
        let data: Vec<i64> = values.iter().map(|&v| v as i64).collect();
        Tensor::from_data(TensorData::new(data, [1, values.len()]), &self.device)
    }
}

/// Indices of the `k` largest probabilities, best first.
pub fn top_k_indices(probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    indexed.truncate(k);
    indexed
}

/// Replace each `[MASK]` in `text`, in order, with the next filler.
/// Masks without a filler are left in place.
pub fn fill_masks(text: &str, fillers: &[&str]) -> String {
    let mut out   = String::with_capacity(text.len());
    let mut parts = text.split(MASK_TOKEN);
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for (i, part) in parts.enumerate() {
        out.push_str(fillers.get(i).copied().unwrap_or(MASK_TOKEN));
        out.push_str(part);
    }
    out
}
