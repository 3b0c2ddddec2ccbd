// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the word-level tokenizer.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper, so the vocabulary is counted here and
// the HuggingFace tokenizer JSON is written by hand.
//
// Id layout:
//   [PAD]=0  [UNK]=1  [CLS]=101  [SEP]=102  [MASK]=103
//   corpus words from 104, most frequent first
//
// Words are counted after running the same BertNormalizer and
// Whitespace pre-tokenizer objects that are serialised into the
// JSON, so every counted word is reachable at encode time
// (accents stripped, CJK characters split one per word).
// The number of classes is the highest id + 1, never more than
// vocab_size.

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::{
    normalizers::bert::BertNormalizer,
    pre_tokenizers::whitespace::Whitespace,
    NormalizedString, Normalizer, OffsetReferential, OffsetType, PreTokenizedString,
    PreTokenizer, Tokenizer,
};

use crate::domain::example::MASK_TOKEN;
use crate::domain::traits::{FixedEncoding, MaskTokenizer};

const FIRST_WORD_ID: usize = 104;

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: PathBuf::from(dir.into()) }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load existing tokenizer or build a new one from texts
    pub fn load_or_build(
        &self,
        texts:      &[String],
        vocab_size: usize,
    ) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from disk");
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!(
                "Cannot load tokenizer from '{}': {}", path.display(), e
            ))
    }

    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Step 1: Word frequencies ──────────────────────────────────────────
        let splitter = WordSplitter::default();
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in splitter.split(text)? {
                *freq.entry(word).or_insert(0) += 1;
            }
        }

        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(FIRST_WORD_ID));

        // ── Step 2: Vocab JSON ────────────────────────────────────────────────
        let mut vocab = serde_json::json!({
            "[PAD]":    0,
            "[UNK]":    1,
            "[CLS]":    101,
            "[SEP]":    102,
            "[MASK]":   103,
        });
        let mut next_id = FIRST_WORD_ID;
        for (word, _) in &words {
            vocab[word] = serde_json::json!(next_id);
            next_id += 1;
        }

        // ── Step 3: HuggingFace tokenizer JSON ────────────────────────────────
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                special_token(0,   "[PAD]"),
                special_token(1,   "[UNK]"),
                special_token(101, "[CLS]"),
                special_token(102, "[SEP]"),
                special_token(103, MASK_TOKEN),
            ],
            "normalizer": serde_json::to_value(splitter.normalizer)?,
            "pre_tokenizer": serde_json::to_value(&splitter.pre_tokenizer)?,
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "[UNK]"
            }
        });

        let tok_path = self.path();
        std::fs::write(&tok_path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| "Cannot write tokenizer JSON")?;

        tracing::info!(
            "Tokenizer built with {} corpus words, saved to '{}'",
            words.len(),
            tok_path.display()
        );

        Tokenizer::from_file(&tok_path)
            .map_err(|e| anyhow::anyhow!("Cannot reload tokenizer: {e}"))
    }
}

fn special_token(id: u32, content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id, "content": content,
        "single_word": false, "lstrip": false, "rstrip": false,
        "normalized": false, "special": true
    })
}

/// Normalizer and pre-tokenizer shared by vocabulary counting
/// and the saved tokenizer.
struct WordSplitter {
    normalizer:    BertNormalizer,
    pre_tokenizer: Whitespace,
}

impl Default for WordSplitter {
    fn default() -> Self {
        Self {
            // clean_text, handle_chinese_chars, strip_accents (follows lowercase), lowercase
            normalizer:    BertNormalizer::new(true, true, None, true),
            pre_tokenizer: Whitespace::default(),
        }
    }
}

impl WordSplitter {
    /// Words of `text` as the tokenizer will see them, with mask
    /// placeholders removed.
    fn split(&self, text: &str) -> Result<Vec<String>> {
        let text = text.replace(MASK_TOKEN, " ");

        let mut normalized = NormalizedString::from(text.as_str());
        self.normalizer
            .normalize(&mut normalized)
            .map_err(|e| anyhow::anyhow!("Normalisation error: {e}"))?;

        let mut pretokenized = PreTokenizedString::from(normalized);
        self.pre_tokenizer
            .pre_tokenize(&mut pretokenized)
            .map_err(|e| anyhow::anyhow!("Pre-tokenisation error: {e}"))?;

        Ok(pretokenized
            .get_splits(OffsetReferential::Normalized, OffsetType::Byte)
            .into_iter()
            .map(|(word, _, _)| word.to_string())
            .collect())
    }
}

/// Number of output classes for a masked LM over this tokenizer:
/// one past the highest token id.
pub fn num_classes(tokenizer: &Tokenizer) -> usize {
    tokenizer
        .get_vocab(true)
        .values()
        .max()
        .map_or(0, |&id| id as usize + 1)
}

impl MaskTokenizer for Tokenizer {
    fn encode_fixed(&self, text: &str, max_len: usize) -> Result<FixedEncoding> {
        let mut ids = self.encode_plain(text)?;
        ids.truncate(max_len);
        let mut attention_mask = vec![1u32; ids.len()];
        ids.resize(max_len, 0);
        attention_mask.resize(max_len, 0);
        Ok(FixedEncoding { ids, attention_mask })
    }

    fn encode_plain(&self, text: &str) -> Result<Vec<u32>> {
        let enc = self
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        Ok(enc.get_ids().to_vec())
    }

    fn token_id(&self, token: &str) -> Option<u32> {
        self.token_to_id(token)
    }
}
