// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File-system concerns shared by the training and preview
// workflows:
//
//   checkpoint.rs  — CompactRecorder weights, best/latest epoch
//                    pointers, TrainConfig and model config JSON
//
//   vocab_store.rs — locates and loads tokenizer.json / vocab.txt
//                    into a Vocabulary
//
//   metrics.rs     — per-epoch loss and accuracy CSV
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary discovery and loading
pub mod vocab_store;

/// Training metrics CSV logger
pub mod metrics;
