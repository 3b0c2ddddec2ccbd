use anyhow::{ensure, Context, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::label_synthesis::{
    premask_mlm_label_features, synthesize_labels, LabelFeatures, MaskedLmLabels,
};
use crate::domain::example::PremaskedExample;
use crate::domain::traits::MaskTokenizer;

/// One tokenised, padded training sample.
/// Sequence format: [CLS] masked inputs [SEP] [PAD]...
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlmSample {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub labels:         MaskedLmLabels,
}

impl MlmSample {
    /// Batching stacks samples row-wise, so every sample must have
    /// exactly `max_seq_len` inputs and `max_predictions` label slots.
    pub fn check_shape(&self, max_seq_len: usize, max_predictions: usize) -> Result<()> {
        ensure!(
            self.input_ids.len() == max_seq_len && self.attention_mask.len() == max_seq_len,
            "sample has {} input ids and {} mask entries but max_seq_len is {}",
            self.input_ids.len(),
            self.attention_mask.len(),
            max_seq_len,
        );
        let labels = &self.labels;
        ensure!(
            [labels.positions.len(), labels.ids.len(), labels.weights.len()]
                .iter()
                .all(|&n| n == max_predictions),
            "sample has {}/{}/{} label positions/ids/weights but max_predictions is {}",
            labels.positions.len(),
            labels.ids.len(),
            labels.weights.len(),
            max_predictions,
        );
        Ok(())
    }
}

/// Encodes model inputs and synthesizes labels for examples.
pub struct SampleBuilder<'a, T: MaskTokenizer + ?Sized> {
    tokenizer:       &'a T,
    max_seq_len:     usize,
    max_predictions: usize,
    cls_id:          u32,
    sep_id:          u32,
}

impl<'a, T: MaskTokenizer + ?Sized> SampleBuilder<'a, T> {
    pub fn new(tokenizer: &'a T, max_seq_len: usize, max_predictions: usize) -> Result<Self> {
        let cls_id = tokenizer.token_id("[CLS]").context("Tokenizer has no '[CLS]' token")?;
        let sep_id = tokenizer.token_id("[SEP]").context("Tokenizer has no '[SEP]' token")?;
        Ok(Self { tokenizer, max_seq_len, max_predictions, cls_id, sep_id })
    }

    /// `[CLS] inputs [SEP]`, truncated and zero-padded to `max_seq_len`.
    /// Returns (input_ids, attention_mask).
    pub fn encode_inputs(&self, inputs: &str) -> Result<(Vec<u32>, Vec<u32>)> {
        let mut input_ids = vec![self.cls_id];
        input_ids.extend(self.tokenizer.encode_plain(inputs)?);
        input_ids.push(self.sep_id);
        input_ids.truncate(self.max_seq_len);

        let mut attention_mask = vec![1u32; input_ids.len()];
        input_ids.resize(self.max_seq_len, 0);
        attention_mask.resize(self.max_seq_len, 0);
        Ok((input_ids, attention_mask))
    }

    /// Build a sample, or `None` when the example carries no MLM
    /// supervision (non-text modality).
    pub fn build(&self, example: &PremaskedExample) -> Result<Option<MlmSample>> {
        let (input_ids, attention_mask) = self.encode_inputs(&example.inputs)?;
        let labels = synthesize_labels(
            &example.target,
            &input_ids,
            example.modality,
            self.tokenizer,
            self.max_predictions,
        )?;
        Ok(labels.map(|labels| MlmSample { input_ids, attention_mask, labels }))
    }

    /// Build samples for a whole corpus, skipping examples without
    /// supervision.
    pub fn build_all(&self, examples: &[PremaskedExample]) -> Result<Vec<MlmSample>> {
        let mut samples    = Vec::with_capacity(examples.len());
        let mut mismatched = 0usize;

        for example in examples {
            match self.build(example)? {
                Some(sample) => {
                    let masks = example.mask_count().min(self.max_predictions);
                    if masks != sample.labels.num_valid() {
                        mismatched += 1;
                    }
                    samples.push(sample);
                }
                None => tracing::debug!("Skipping {:?} example", example.modality),
            }
        }

        if mismatched > 0 {
            tracing::warn!(
                "{} examples have a target token count that differs from their mask count",
                mismatched
            );
        }
        Ok(samples)
    }

    /// The persisted form of one example: model inputs plus the
    /// namespaced label features. Empty labels for non-text input.
    pub fn build_record(&self, problem: &str, example: &PremaskedExample) -> Result<FeatureRecord> {
        let (input_ids, attention_mask) = self.encode_inputs(&example.inputs)?;
        let labels = premask_mlm_label_features(
            problem,
            &example.target,
            &input_ids,
            example.modality,
            self.tokenizer,
            self.max_predictions,
        )?;
        Ok(FeatureRecord { input_ids, attention_mask, labels })
    }
}

/// One line of a prepared features file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    #[serde(flatten)]
    pub labels:         LabelFeatures,
}

impl FeatureRecord {
    /// Turn a prepared record back into a sample; `None` when the
    /// record carries no labels for `problem`.
    pub fn into_sample(self, problem: &str) -> Result<Option<MlmSample>> {
        if self.labels.is_empty() {
            return Ok(None);
        }
        let labels = MaskedLmLabels::from_features(problem, &self.labels)?;
        Ok(Some(MlmSample {
            input_ids:      self.input_ids,
            attention_mask: self.attention_mask,
            labels,
        }))
    }
}

pub struct MlmDataset {
    samples: Vec<MlmSample>,
}

impl MlmDataset {
    pub fn new(samples: Vec<MlmSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<MlmSample> for MlmDataset {
    fn get(&self, index: usize) -> Option<MlmSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
