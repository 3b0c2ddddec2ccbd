// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by the other layers:
//
//   checkpoint.rs      — model weights (Burn's CompactRecorder)
//                        plus TrainConfig as JSON, so prediction
//                        can rebuild the exact architecture
//
//   tokenizer_store.rs — builds the word-level tokenizer from the
//                        corpus or loads the saved one; also
//                        implements MaskTokenizer for it
//
//   metrics.rs         — per-epoch CSV of loss, weighted masked
//                        accuracy and degenerate batch counts

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;
