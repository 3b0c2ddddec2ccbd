// ============================================================
// Layer 5 — Text Encoder
// ============================================================
// Post-norm Transformer encoder producing per-token hidden states.
//
//   input_ids [b, s]
//       │  token_embedding (+ lift when embedding_size != d_model)
//       │  + position_embedding
//       ▼
//   EncoderBlock × num_layers   (self-attention, GELU FFN)
//       │
//       ▼
//   final_norm → HiddenFeatures.seq [b, s, d_model]
//
// Padding (attention_mask == 0) is masked out of attention.

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct TextEncoderConfig {
    /// Rows of the token-embedding table (the label encoder's class count)
    pub vocab_size:     usize,
    /// Rows of the position-embedding table
    pub max_seq_len:    usize,
    pub d_model:        usize,
    /// Width of the token-embedding table. When it differs from
    /// d_model a linear map lifts embeddings to d_model.
    pub embedding_size: usize,
    pub num_heads:      usize,
    pub num_layers:     usize,
    /// Inner width of each feed-forward block
    pub d_ff:           usize,
    pub dropout:        f64,
}

impl TextEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TextEncoder<B> {
        let token_embedding = EmbeddingConfig::new(self.vocab_size, self.embedding_size).init(device);
        let embedding_projection = (self.embedding_size != self.d_model)
            .then(|| LinearConfig::new(self.embedding_size, self.d_model).init(device));
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        TextEncoder {
            token_embedding, embedding_projection, position_embedding,
            layers, final_norm, dropout,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `mask_pad`: [batch, seq_len], true where the token is padding.
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let input = MhaInput::self_attn(x.clone()).mask_pad(mask_pad);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

/// Hidden features handed to task heads.
#[derive(Debug, Clone)]
pub struct HiddenFeatures<B: Backend> {
    /// Per-token hidden states: [batch, seq_len, d_model]
    pub seq: Tensor<B, 3>,
}

/// Transformer encoder. Owns the token-embedding table that a
/// masked LM head may tie its output projection to.
#[derive(Module, Debug)]
pub struct TextEncoder<B: Backend> {
    /// [vocab_size, embedding_size]
    pub token_embedding:      Embedding<B>,
    /// embedding_size → d_model; `None` when they are equal
    pub embedding_projection: Option<Linear<B>>,
    pub position_embedding:   Embedding<B>,
    pub layers:               Vec<EncoderBlock<B>>,
    pub final_norm:           LayerNorm<B>,
    pub dropout:              Dropout,
}

impl<B: Backend> TextEncoder<B> {
    /// input_ids, attention_mask: [batch, seq_len] → seq: [batch, seq_len, d_model]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> HiddenFeatures<B> {
        let [batch_size, seq_len] = input_ids.dims();

        // ── Embeddings ────────────────────────────────────────────────────────
        let mut tok_emb = self.token_embedding.forward(input_ids);
        if let Some(projection) = &self.embedding_projection {
            tok_emb = projection.forward(tok_emb);
        }

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        // ── Encoder stack ─────────────────────────────────────────────────────
        let mask_pad = attention_mask.equal_elem(0);

        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
        }

        HiddenFeatures { seq: self.final_norm.forward(x) }
    }

    /// Width of the token-embedding table.
    pub fn embedding_size(&self) -> usize {
        self.token_embedding.weight.val().dims()[1]
    }
}
