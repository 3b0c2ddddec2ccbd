// Test-only tokenizer: whitespace split over a fixed vocabulary.
// Ids follow the word-level store: [PAD]=0, [UNK]=1,
// [CLS]=101, [SEP]=102, [MASK]=103, words from 104.

use std::collections::HashMap;

use anyhow::Result;

use crate::domain::example::MASK_TOKEN;
use crate::domain::traits::{FixedEncoding, MaskTokenizer};

pub struct WordTokenizer {
    vocab: HashMap<String, u32>,
}

impl WordTokenizer {
    pub fn new(words: &[&str]) -> Self {
        let mut vocab = HashMap::new();
        vocab.insert("[PAD]".to_string(), 0);
        vocab.insert("[UNK]".to_string(), 1);
        vocab.insert("[CLS]".to_string(), 101);
        vocab.insert("[SEP]".to_string(), 102);
        vocab.insert(MASK_TOKEN.to_string(), 103);
        for (i, w) in words.iter().enumerate() {
            vocab.insert(w.to_string(), 104 + i as u32);
        }
        Self { vocab }
    }

    pub fn id(&self, word: &str) -> u32 {
        self.vocab.get(word).copied().unwrap_or(1)
    }
}

impl MaskTokenizer for WordTokenizer {
    fn encode_fixed(&self, text: &str, max_len: usize) -> Result<FixedEncoding> {
        let mut ids = self.encode_plain(text)?;
        ids.truncate(max_len);
        let mut attention_mask = vec![1; ids.len()];
        ids.resize(max_len, 0);
        attention_mask.resize(max_len, 0);
        Ok(FixedEncoding { ids, attention_mask })
    }

    fn encode_plain(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.split_whitespace().map(|w| self.id(w)).collect())
    }

    fn token_id(&self, token: &str) -> Option<u32> {
        self.vocab.get(token).copied()
    }
}
