// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model code lives here.
//
//   encoder.rs    — transformer text encoder; owns the token
//                   embedding table and yields HiddenFeatures
//
//   head.rs       — masked LM head: gathers masked positions,
//                   projects to the vocabulary through the
//                   encoder's table (tied) or its own Linear,
//                   registers a weighted loss, returns softmax
//
//   loss.rs       — gather / pad / weighted cross-entropy
//                   helpers and the per-step LossRegistry
//
//   model.rs      — encoder + head wired together
//
//   trainer.rs    — train/validation loop, checkpoint per epoch
//
//   inferencer.rs — loads a checkpoint and fills [MASK] slots
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Devlin et al. (2019) BERT

/// Transformer encoder producing per-token hidden states
pub mod encoder;

/// Masked LM prediction head and projection choice
pub mod head;

/// Loss helpers and the loss registry
pub mod loss;

/// Encoder + masked LM head
pub mod model;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference engine: loads a checkpoint and predicts mask tokens
pub mod inferencer;
