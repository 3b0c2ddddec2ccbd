// ============================================================
// Layer 5 — Masked LM Head
// ============================================================
// Projects encoder hidden states to vocabulary distributions for
// pre-masked input.
//
//   Train / Eval:
//     seq [b, s, h] ──gather at positions──► [b, P, h]
//                   ──projection──────────► logits [b, P, V]
//                   ──masked CE───────────► registered loss
//   Predict:
//     seq [b, s, h] ──projection──────────► logits [b, s, V]
//
// Both paths return softmax(logits) over the vocabulary.
//
// Projection: either an independent Linear(h → V), or tied to
// the encoder's token-embedding table E [V, h] as x · Eᵀ. A tied
// head holds no weights; it reads E from the encoder on every
// forward, so optimiser updates to E are always visible.
//
// Loss registration:
//   finite weighted CE ──► LossRegistry::add          (trainable)
//   no weighted slot,
//   or NaN / inf CE    ──► LossRegistry::add_degenerate (constant 0)

use anyhow::{Context, Result};
use burn::{
    module::Ignored,
    nn::{Embedding, Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

use crate::domain::mode::Mode;
use crate::ml::encoder::HiddenFeatures;
use crate::ml::loss::{
    finite_loss, gather_indexes, masked_sparse_cross_entropy, pad_to_length, LossRegistry,
};

/// Label tensors for one batch. Positions [batch, P]; ids and
/// weights [batch, L], index-aligned with positions.
#[derive(Debug, Clone)]
pub struct MaskedLmTargets<B: Backend> {
    pub positions: Tensor<B, 2, Int>,
    pub ids:       Tensor<B, 2, Int>,
    pub weights:   Tensor<B, 2, Int>,
}

/// How the vocabulary projection was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionChoice {
    /// Sharing requested and dimensions match.
    Tied { vocab_size: usize },
    /// Sharing not requested.
    Independent { vocab_size: usize },
    /// Sharing requested but the table width differs from the
    /// hidden size (or no table was supplied).
    Fallback { vocab_size: usize, embedding_size: Option<usize> },
}

impl ProjectionChoice {
    pub fn vocab_size(self) -> usize {
        match self {
            ProjectionChoice::Tied { vocab_size }
            | ProjectionChoice::Independent { vocab_size }
            | ProjectionChoice::Fallback { vocab_size, .. } => vocab_size,
        }
    }

    pub fn is_tied(self) -> bool {
        matches!(self, ProjectionChoice::Tied { .. })
    }
}

/// Decide between a tied and an independent projection.
///
/// `table_dims` is `[vocab_size, embedding_size]` of the shared
/// table, if one is supplied. When sharing is requested the
/// vocabulary size comes from the table.
pub fn resolve_projection(
    share_embedding: bool,
    hidden_size:     usize,
    vocab_size:      usize,
    table_dims:      Option<[usize; 2]>,
) -> ProjectionChoice {
    if !share_embedding {
        return ProjectionChoice::Independent { vocab_size };
    }

    match table_dims {
        Some([table_vocab, embedding_size]) if embedding_size == hidden_size => {
            ProjectionChoice::Tied { vocab_size: table_vocab }
        }
        Some([table_vocab, embedding_size]) => {
            tracing::warn!(
                "Share embedding is enabled but hidden_size ({}) != embedding_size ({}); \
                 using an independent output projection",
                hidden_size,
                embedding_size,
            );
            ProjectionChoice::Fallback {
                vocab_size:     table_vocab,
                embedding_size: Some(embedding_size),
            }
        }
        None => {
            tracing::warn!(
                "Share embedding is enabled but no embedding table was supplied; \
                 using an independent output projection"
            );
            ProjectionChoice::Fallback { vocab_size, embedding_size: None }
        }
    }
}

#[derive(Config, Debug)]
pub struct MaskedLmHeadConfig {
    /// Task name; the loss is registered under it.
    pub problem:     String,
    pub hidden_size: usize,
    pub vocab_size:  usize,
    #[config(default = false)]
    pub share_embedding: bool,
}

impl MaskedLmHeadConfig {
    /// Build the head once. `embedding` is the encoder's token
    /// table; it is only inspected here, never copied.
    pub fn init<B: Backend>(
        &self,
        device:    &B::Device,
        embedding: Option<&Embedding<B>>,
    ) -> MaskedLmHead<B> {
        let table_dims = embedding.map(|e| e.weight.val().dims());
        let choice = resolve_projection(
            self.share_embedding,
            self.hidden_size,
            self.vocab_size,
            table_dims,
        );

        let decoder = (!choice.is_tied()).then(|| {
            LinearConfig::new(self.hidden_size, choice.vocab_size()).init(device)
        });

        tracing::debug!(
            "Masked LM head '{}': {:?}",
            self.problem,
            choice,
        );

        MaskedLmHead {
            decoder,
            vocab_size: choice.vocab_size(),
            problem:    Ignored(self.problem.clone()),
        }
    }
}

#[derive(Module, Debug)]
pub struct MaskedLmHead<B: Backend> {
    /// `None` when tied to the encoder's embedding table.
    decoder:    Option<Linear<B>>,
    vocab_size: usize,
    problem:    Ignored<String>,
}

impl<B: Backend> MaskedLmHead<B> {
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn share_embedding(&self) -> bool {
        self.decoder.is_none()
    }

    pub fn problem(&self) -> &str {
        &self.problem.0
    }

    /// Raw vocabulary logits for `x` [batch, n, hidden].
    pub fn project(&self, x: Tensor<B, 3>, embedding: &Embedding<B>) -> Tensor<B, 3> {
        match &self.decoder {
            Some(decoder) => decoder.forward(x),
            None => x.matmul(embedding.weight.val().transpose().unsqueeze()),
        }
    }

    /// Run the head.
    ///
    /// In Train/Eval `targets` is required: the loss over masked
    /// positions is registered in `losses` under the problem name
    /// and the returned probabilities are [batch, P, vocab]. In
    /// Predict `targets` is ignored and the result is
    /// [batch, seq_len, vocab].
    pub fn forward(
        &self,
        features:  HiddenFeatures<B>,
        targets:   Option<&MaskedLmTargets<B>>,
        mode:      Mode,
        embedding: &Embedding<B>,
        losses:    &mut LossRegistry<B>,
    ) -> Result<Tensor<B, 3>> {
        let seq = features.seq;

        if !mode.uses_labels() {
            let logits = self.project(seq, embedding);
            return Ok(activation::softmax(logits, 2));
        }

        let targets = targets.with_context(|| {
            format!("{:?} forward of '{}' needs masked LM targets", mode, self.problem())
        })?;

        let [_, _, hidden] = seq.dims();
        let [batch, predictions] = targets.positions.dims();

        // gather flattens to [batch * P, hidden]; restore the batch axis
        let gathered = gather_indexes(seq, targets.positions.clone())
            .reshape([batch, predictions, hidden]);
        let logits = self.project(gathered, embedding);

        let [_, len, _] = logits.dims();
        let labels  = pad_to_length(targets.ids.clone(), len);
        let weights = pad_to_length(targets.weights.clone(), len);

        let loss = masked_sparse_cross_entropy(logits.clone(), labels, weights)
            .and_then(finite_loss);
        match loss {
            Some(loss) => losses.add(self.problem(), loss),
            None => {
                tracing::debug!("'{}' has no usable loss for this batch", self.problem());
                losses.add_degenerate(self.problem(), &logits.device());
            }
        }

        Ok(activation::softmax(logits, 2))
    }
}
