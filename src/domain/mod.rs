// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what the
// system works with. Nothing here knows about Burn tensors,
// files, or the tokenizer implementation.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain data and the traits other layers implement

// A pre-masked training example and its modality
pub mod example;

// The phase a forward pass runs in (train / eval / predict)
pub mod mode;

// Capabilities other layers provide (example sources, tokenizers)
pub mod traits;
