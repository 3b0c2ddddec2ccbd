// ============================================================
// Layer 4 — Masked LM Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks a Vec<MlmSample> into
// the tensors one forward pass needs.
//
//   input_ids, attention_mask  → [batch, seq_len]
//   positions, ids, weights    → [batch, P]
//
// Every per-example array is flattened row-major and reshaped,
// so row i of each tensor belongs to sample i. Positions stay
// relative to their own row; the head adds the
// batch_index * seq_len offset when it gathers.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::MlmSample;
use crate::ml::head::MaskedLmTargets;

#[derive(Debug, Clone)]
pub struct MlmBatch<B: Backend> {
    /// [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// [batch_size, seq_len], 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,

    /// Label tensors, each [batch_size, P]
    pub targets: MaskedLmTargets<B>,
}

#[derive(Clone, Debug)]
pub struct MlmBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> MlmBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack<F>(&self, items: &[MlmSample], width: usize, field: F) -> Tensor<B, 2, Int>
    where
        F: Fn(&MlmSample) -> &[u32],
    {
        let flat: Vec<i32> = items
            .iter()
            .flat_map(|s| field(s).iter().map(|&x| x as i32))
            .collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([items.len(), width])
    }
}

impl<B: Backend> Batcher<MlmSample, MlmBatch<B>> for MlmBatcher<B> {
    // All samples are pre-padded by SampleBuilder, so the first
    // sample's lengths hold for the whole batch.
    fn batch(&self, items: Vec<MlmSample>) -> MlmBatch<B> {
        let seq_len     = items[0].input_ids.len();
        let predictions = items[0].labels.positions.len();
        let label_len   = items[0].labels.ids.len();

        let input_ids      = self.stack(&items, seq_len, |s| s.input_ids.as_slice());
        let attention_mask = self.stack(&items, seq_len, |s| s.attention_mask.as_slice());

        let targets = MaskedLmTargets {
            positions: self.stack(&items, predictions, |s| s.labels.positions.as_slice()),
            ids:       self.stack(&items, label_len, |s| s.labels.ids.as_slice()),
            weights:   self.stack(&items, label_len, |s| s.labels.weights.as_slice()),
        };

        MlmBatch { input_ids, attention_mask, targets }
    }
}
