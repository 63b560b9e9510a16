// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits that define the core
// concepts of the pretraining pipeline.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// The data layer (Layer 4) turns these into training samples,
// the ML layer (Layer 5) turns samples into tensors.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// One (image, report, label) triple and its per-access derivatives
pub mod record;

// Attention modes and segment-id schemes
pub mod mode;

// Typed pipeline failures
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
