// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the JSONL manifest and GPU-ready tensors.
//
//   manifest.jsonl
//       │
//       ▼
//   JsonlLoader       → immutable Vec<Record> (loaded once)
//       │
//       ▼
//   split_train_val   → seeded record-level split
//       │
//       ▼
//   CxrDataset::get   → per access, nothing cached:
//       ├── PairSampler        aligned or negative report
//       ├── Vocabulary         word pieces → ids
//       ├── XrayImageLoader    pixels
//       ├── MaskingPolicy      MLM corruption + labels
//       └── SequenceAssembler  padding, segments, attention mask
//       │
//       ▼
//   CxrBatcher        → eight stacked tensors
//       │
//       ▼
//   DataLoader        → training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the JSONL manifest into records
pub mod loader;

/// Token → id mapping and special tokens
pub mod vocab;

/// ITM negative sampling with fuzzy label filtering
pub mod pair_sampler;

/// BERT-style 80/10/10 masking
pub mod masking;

/// Builds one fixed-shape sample
pub mod assembler;

/// X-ray decoding and normalisation
pub mod image;

/// Implements Burn's Dataset trait
pub mod dataset;

/// Implements Burn's Batcher trait
pub mod batcher;

/// Seeded train/validation split
pub mod splitter;
