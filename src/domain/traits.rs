// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits, not to the
// concrete loader or tokenizer:
//   - JsonlLoader implements ExampleSource
//   - tokenizers::Tokenizer implements MaskTokenizer
//
// Tests implement MaskTokenizer with a tiny whitespace
// vocabulary so label synthesis can be checked without a
// tokenizer file on disk.

use anyhow::{Context, Result};
use crate::domain::example::{PremaskedExample, MASK_TOKEN};

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can produce pre-masked examples.
pub trait ExampleSource {
    fn load_all(&self) -> Result<Vec<PremaskedExample>>;
}

// ─── FixedEncoding ────────────────────────────────────────────────────────────
/// Output of a fixed-length encode: both vectors have exactly
/// the requested length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedEncoding {
    pub ids:            Vec<u32>,
    /// 1 = real token, 0 = padding
    pub attention_mask: Vec<u32>,
}

// ─── MaskTokenizer ────────────────────────────────────────────────────────────
/// The tokenizer capability label synthesis needs.
pub trait MaskTokenizer {
    /// Tokenize `text` without special tokens, truncating and
    /// right-padding to exactly `max_len` positions.
    fn encode_fixed(&self, text: &str, max_len: usize) -> Result<FixedEncoding>;

    /// Tokenize `text` without special tokens and without padding.
    fn encode_plain(&self, text: &str) -> Result<Vec<u32>>;

    /// Look up a literal token (e.g. `[CLS]`) in the vocabulary.
    fn token_id(&self, token: &str) -> Option<u32>;

    /// Resolve the literal mask token to its id.
    fn mask_token_id(&self) -> Result<u32> {
        self.token_id(MASK_TOKEN)
            .with_context(|| format!("Tokenizer has no '{MASK_TOKEN}' token"))
    }
}
