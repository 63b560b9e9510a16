// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: each use case wires the data,
// ml and infra layers together for one command. No model math
// and no argument parsing here.
//
//   train_use_case.rs   — full pretraining run
//   preview_use_case.rs — assemble a few samples as JSON
//
// Reference: Clean Architecture pattern

/// Pretraining workflow and its configuration
pub mod train_use_case;

/// Data-pipeline inspection without a model
pub mod preview_use_case;
