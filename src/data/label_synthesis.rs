// ============================================================
// Layer 4 — Masked LM Label Synthesis
// ============================================================
// Turns one pre-masked example into the three fixed-length
// arrays the masked LM head consumes:
//
//   positions — where the [MASK] tokens sit in the model input
//   ids       — the target tokens supervising those slots
//   weights   — 1 for a real target token, 0 for padding
//
// All three have length P (max predictions per example).
// Masks beyond P are dropped; callers with more than P masks
// per example lose the excess supervision.
//
// Position 0 is both a legal index and the padding value.
// Only `weights` says whether a slot is real.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::example::Modality;
use crate::domain::traits::MaskTokenizer;

/// Default cap on masked predictions per example.
pub const MAX_PREDICTIONS_PER_SEQ: usize = 20;

/// Feature mapping keyed by `<problem>_masked_lm_*`.
pub type LabelFeatures = BTreeMap<String, Vec<u32>>;

pub fn positions_key(problem: &str) -> String {
    format!("{problem}_masked_lm_positions")
}

pub fn ids_key(problem: &str) -> String {
    format!("{problem}_masked_lm_ids")
}

pub fn weights_key(problem: &str) -> String {
    format!("{problem}_masked_lm_weights")
}

/// Index-aligned label arrays for one example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedLmLabels {
    pub positions: Vec<u32>,
    pub ids:       Vec<u32>,
    pub weights:   Vec<u32>,
}

impl MaskedLmLabels {
    /// Number of slots that carry real supervision.
    pub fn num_valid(&self) -> usize {
        self.weights.iter().filter(|&&w| w != 0).count()
    }

    /// Key the arrays under the problem's namespace.
    pub fn into_features(self, problem: &str) -> LabelFeatures {
        let mut features = LabelFeatures::new();
        features.insert(positions_key(problem), self.positions);
        features.insert(ids_key(problem), self.ids);
        features.insert(weights_key(problem), self.weights);
        features
    }

    /// Read the arrays back out of a keyed mapping.
    pub fn from_features(problem: &str, features: &LabelFeatures) -> Result<Self> {
        let take = |key: String| -> Result<Vec<u32>> {
            features
                .get(&key)
                .cloned()
                .with_context(|| format!("Missing feature '{key}'"))
        };
        let labels = Self {
            positions: take(positions_key(problem))?,
            ids:       take(ids_key(problem))?,
            weights:   take(weights_key(problem))?,
        };
        if labels.ids.len() != labels.weights.len() {
            bail!(
                "'{}' has {} entries but '{}' has {}",
                ids_key(problem),
                labels.ids.len(),
                weights_key(problem),
                labels.weights.len(),
            );
        }
        Ok(labels)
    }
}

/// Build the label arrays for one example.
///
/// `context_ids` is the tokenized model input the positions index
/// into; it must be the same sequence the encoder will see.
/// Returns `None` for non-text modalities.
pub fn synthesize_labels<T: MaskTokenizer + ?Sized>(
    target:          &str,
    context_ids:     &[u32],
    modality:        Modality,
    tokenizer:       &T,
    max_predictions: usize,
) -> Result<Option<MaskedLmLabels>> {
    if !modality.is_text() {
        return Ok(None);
    }

    let encoded = tokenizer
        .encode_fixed(target, max_predictions)
        .context("Cannot tokenize masked LM target")?;
    let mask_id = tokenizer.mask_token_id()?;

    let mut positions: Vec<u32> = context_ids
        .iter()
        .enumerate()
        .filter(|&(_, &id)| id == mask_id)
        .map(|(i, _)| i as u32)
        .collect();
    if positions.len() > max_predictions {
        tracing::debug!(
            "Dropping {} masked positions beyond the cap of {}",
            positions.len() - max_predictions,
            max_predictions,
        );
    }
    positions.resize(max_predictions, 0);

    Ok(Some(MaskedLmLabels {
        positions,
        ids:     encoded.ids,
        weights: encoded.attention_mask,
    }))
}

/// Keyed form of [`synthesize_labels`]: an empty mapping for
/// non-text modalities, otherwise the three namespaced arrays.
pub fn premask_mlm_label_features<T: MaskTokenizer + ?Sized>(
    problem:         &str,
    target:          &str,
    context_ids:     &[u32],
    modality:        Modality,
    tokenizer:       &T,
    max_predictions: usize,
) -> Result<LabelFeatures> {
    Ok(
        synthesize_labels(target, context_ids, modality, tokenizer, max_predictions)?
            .map(|labels| labels.into_features(problem))
            .unwrap_or_default(),
    )
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testing::WordTokenizer;

    const P: usize = MAX_PREDICTIONS_PER_SEQ;

    #[test]
    fn test_the_mask_sat_scenario() {
        let tok     = WordTokenizer::new(&["the", "sat", "cat"]);
        let mask    = tok.mask_token_id().unwrap();
        let the     = tok.id("the");
        let sat     = tok.id("sat");
        let context = vec![the, mask, sat];

        let labels = synthesize_labels("the [MASK] sat", &context, Modality::Text, &tok, P)
            .unwrap()
            .unwrap();

        let mut expected_positions = vec![0u32; P];
        expected_positions[0] = 1;
        assert_eq!(labels.positions, expected_positions);

        let expected = tok.encode_fixed("the [MASK] sat", P).unwrap();
        assert_eq!(labels.ids, expected.ids);
        assert_eq!(labels.weights, expected.attention_mask);
        assert_eq!(&labels.ids[..3], &[the, mask, sat]);
        assert_eq!(&labels.weights[..4], &[1, 1, 1, 0]);
    }

    #[test]
    fn test_lengths_fixed_with_no_masks() {
        let tok    = WordTokenizer::new(&["a", "b"]);
        let ctx    = vec![tok.id("a"), tok.id("b")];
        let labels = synthesize_labels("a", &ctx, Modality::Text, &tok, P).unwrap().unwrap();

        assert_eq!(labels.positions.len(), P);
        assert_eq!(labels.ids.len(), P);
        assert_eq!(labels.weights.len(), P);
        assert!(labels.positions.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_more_than_cap_masks_are_truncated() {
        let tok     = WordTokenizer::new(&["a"]);
        let mask    = tok.mask_token_id().unwrap();
        let context = vec![mask; 25];
        let target  = vec!["a"; 25].join(" ");

        let labels = synthesize_labels(&target, &context, Modality::Text, &tok, P)
            .unwrap()
            .unwrap();

        assert_eq!(labels.positions, (0..P as u32).collect::<Vec<_>>());
        assert_eq!(labels.ids.len(), P);
        assert_eq!(labels.weights, vec![1; P]);
    }

    #[test]
    fn test_non_text_modality_gives_empty_mapping() {
        let tok      = WordTokenizer::new(&["a"]);
        let features = premask_mlm_label_features(
            "mlm", "a", &[tok.mask_token_id().unwrap()], Modality::Image, &tok, P,
        )
        .unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn test_real_mask_at_position_zero_is_kept() {
        // Slot 0 points at index 0 and is real; slot 1 is padding
        // with the same position value. Only weights differ.
        let tok    = WordTokenizer::new(&["cat", "sat"]);
        let mask   = tok.mask_token_id().unwrap();
        let ctx    = vec![mask, tok.id("sat")];
        let labels = synthesize_labels("cat", &ctx, Modality::Text, &tok, P).unwrap().unwrap();

        assert_eq!(labels.positions[0], 0);
        assert_eq!(labels.positions[1], 0);
        assert_eq!(labels.weights[0], 1);
        assert_eq!(labels.weights[1], 0);
        assert_eq!(labels.num_valid(), 1);
    }

    #[test]
    fn test_feature_keys_are_namespaced() {
        let tok      = WordTokenizer::new(&["a"]);
        let ctx      = vec![tok.mask_token_id().unwrap()];
        let features =
            premask_mlm_label_features("wiki", "a", &ctx, Modality::Text, &tok, P).unwrap();

        let keys: Vec<&str> = features.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["wiki_masked_lm_ids", "wiki_masked_lm_positions", "wiki_masked_lm_weights"],
        );

        let back = MaskedLmLabels::from_features("wiki", &features).unwrap();
        assert_eq!(back.positions[0], 0);
        assert_eq!(back.num_valid(), 1);
    }

    #[test]
    fn test_from_features_reports_missing_key() {
        let err = MaskedLmLabels::from_features("wiki", &LabelFeatures::new()).unwrap_err();
        assert!(err.to_string().contains("wiki_masked_lm_positions"));
    }

    #[test]
    fn test_configurable_cap() {
        let tok    = WordTokenizer::new(&["a"]);
        let mask   = tok.mask_token_id().unwrap();
        let labels = synthesize_labels("a a a", &[mask, mask, mask], Modality::Text, &tok, 2)
            .unwrap()
            .unwrap();
        assert_eq!(labels.positions, vec![0, 1]);
        assert_eq!(labels.ids.len(), 2);
    }
}
