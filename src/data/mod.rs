// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From a JSONL file of pre-masked examples to tensor batches:
//
//   examples.jsonl
//       │
//       ▼
//   JsonlLoader       → parses PremaskedExample records
//       │
//       ▼
//   SampleBuilder     → encodes inputs, runs label synthesis
//       │
//       ▼
//   split_train_val   → seeded shuffle + split
//       │
//       ▼
//   MlmDataset        → Burn's Dataset trait
//       │
//       ▼
//   MlmBatcher        → stacks samples into tensors
//
// Each module does one step and is tested on its own.

/// Reads pre-masked examples from JSONL
pub mod loader;

/// Builds positions / ids / weights arrays for one example
pub mod label_synthesis;

/// Samples, prepared feature records, and the Burn dataset
pub mod dataset;

/// Implements Burn's Batcher trait for masked LM samples
pub mod batcher;

/// Seeded train/validation split
pub mod splitter;

#[cfg(test)]
pub(crate) mod testing;
