// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds or runs tensors on a Burn backend.
// (The batcher in the data layer is the one exception: it
// turns assembled samples into tensors.)
//
//   patch_encoder.rs — Conv2d patch features + patch position ids
//   embeddings.rs    — text/image embeddings and their fusion
//                      into one [CLS] img.. [SEP] report [SEP] row
//   model.rs         — encoder stack, pooler, MLM and ITM heads
//   loss.rs          — masked cross-entropy, ITM loss, accuracy
//   trainer.rs       — epoch loop, validation, checkpointing
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Devlin et al. (2019) BERT

/// Image patch features
pub mod patch_encoder;

/// Token, segment and position embeddings
pub mod embeddings;

/// CXR-BERT architecture
pub mod model;

/// Pretraining objectives and accuracy counters
pub mod loss;

/// Training loop with validation and checkpointing
pub mod trainer;
