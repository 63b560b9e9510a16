// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The pipeline talks to its collaborators through these traits
// so each one can be swapped (or faked in tests) independently:
//
//   RecordSource → where records come from (JSONL file, fixtures)
//   ImageSource  → how an X-ray path becomes pixels
//
// Both are Send + Sync because data-loader workers share them.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use crate::domain::error::PipelineResult;
use crate::domain::record::Record;

// ─── RecordSource ─────────────────────────────────────────────────────────────
/// Any component that can produce the full list of records.
///
/// Loading is eager and happens once at startup; a malformed
/// record fails the whole pass.
pub trait RecordSource {
    fn load_all(&self) -> PipelineResult<Vec<Record>>;
}

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Turns an image reference into a fixed-shape CHW float buffer.
pub trait ImageSource: Send + Sync {
    /// Shape of every buffer this source returns: [channels, height, width]
    fn shape(&self) -> [usize; 3];

    fn load(&self, path: &str) -> PipelineResult<Vec<f32>>;

    /// Number of values in one image buffer
    fn numel(&self) -> usize {
        self.shape().iter().product()
    }
}
