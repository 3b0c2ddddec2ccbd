// ============================================================
// Layer 3 — PremaskedExample Domain Type
// ============================================================
// One raw example as it arrives from upstream. Masking has
// already been decided: `inputs` carries `[MASK]` placeholders
// and `target` carries the tokens those placeholders stand for,
// in order.
//
// Example:
//   inputs: "the [MASK] sat on the [MASK]"
//   target: "cat mat"

use serde::{Deserialize, Serialize};

/// The literal placeholder used in pre-masked text.
pub const MASK_TOKEN: &str = "[MASK]";

/// Input modality of an example. Only text produces MLM supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Text,
    Image,
    Audio,
}

impl Modality {
    pub fn is_text(self) -> bool {
        matches!(self, Modality::Text)
    }
}

/// A pre-masked example read from a JSONL corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremaskedExample {
    /// Model input with mask placeholders already inserted
    pub inputs: String,

    /// Tokens that supervise the masked slots, in slot order
    pub target: String,

    /// Defaults to text when the field is absent
    #[serde(default)]
    pub modality: Modality,
}

impl PremaskedExample {
    /// Number of mask placeholders in the raw input text.
    pub fn mask_count(&self) -> usize {
        self.inputs.matches(MASK_TOKEN).count()
    }
}

// Corpus examples come from serde; these builders are for tests.
#[cfg(test)]
impl PremaskedExample {
    pub fn new(inputs: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            inputs:   inputs.into(),
            target:   target.into(),
            modality: Modality::Text,
        }
    }

    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modality_defaults_to_text() {
        let ex: PremaskedExample =
            serde_json::from_str(r#"{"inputs": "a [MASK]", "target": "b"}"#).unwrap();
        assert_eq!(ex.modality, Modality::Text);
        assert!(ex.modality.is_text());
    }

    #[test]
    fn test_modality_parses_lowercase() {
        let ex: PremaskedExample = serde_json::from_str(
            r#"{"inputs": "x", "target": "y", "modality": "image"}"#,
        )
        .unwrap();
        assert_eq!(ex.modality, Modality::Image);
        assert!(!ex.modality.is_text());
    }

    #[test]
    fn test_mask_count() {
        let ex = PremaskedExample::new("the [MASK] sat on the [MASK]", "cat mat");
        assert_eq!(ex.mask_count(), 2);
    }
}
