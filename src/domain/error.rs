// ============================================================
// Layer 3 — Pipeline Errors
// ============================================================
// Every failure the pipeline can surface as a typed value.
//
// Where each one is raised:
//   MalformedRecord → JSONL loading, fatal for the load pass
//   UnsupportedMode → pipeline construction, never per sample
//   InvalidConfig   → pipeline / model construction
//   ShapeMismatch   → embedding fusion, fail fast
//   Vocabulary      → vocabulary loading
//   Image           → image decoding
//
// The application and CLI layers wrap these in anyhow::Error
// with extra context, the same way they wrap I/O errors.
//
// Reference: Rust Book §9 (Error Handling)
//            thiserror crate documentation

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed record at {path}:{line}: {reason}")]
    MalformedRecord {
        path:   String,
        line:   usize,
        reason: String,
    },

    #[error("unsupported attention mode '{0}' (expected \"s2s\" or \"bi\")")]
    UnsupportedMode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context:  &'static str,
        expected: usize,
        actual:   usize,
    },

    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    #[error("cannot load image '{path}': {reason}")]
    Image {
        path:   String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
