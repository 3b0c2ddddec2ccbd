// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor math, no printing, no
// direct file formats. Each use case tells the data, ml and
// infra layers what to do in which order.

/// Training workflow and its configuration
pub mod train_use_case;

/// Label synthesis over a corpus, written to a features file
pub mod prepare_use_case;

/// Mask filling with a trained checkpoint
pub mod predict_use_case;
