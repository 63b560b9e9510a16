// ============================================================
// Layer 3 — Attention Modes and Segment Schemes
// ============================================================
// The pipeline trains with two attention regimes:
//
//   s2s — the report is decoded left to right. Every position
//         sees the whole image prefix, but inside the text span
//         a token only sees itself and earlier tokens.
//
//   bi  — BERT-style: every real position sees every other
//         real position, padding is invisible.
//
// Mode strings come from configuration, so they are parsed once
// at pipeline construction. An unknown string is a hard error
// there, never a per-sample surprise.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttentionMode {
    #[serde(rename = "s2s")]
    Seq2Seq,
    #[serde(rename = "bi")]
    Bidirectional,
}

impl AttentionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttentionMode::Seq2Seq       => "s2s",
            AttentionMode::Bidirectional => "bi",
        }
    }
}

impl FromStr for AttentionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s2s" => Ok(AttentionMode::Seq2Seq),
            "bi"  => Ok(AttentionMode::Bidirectional),
            other => Err(PipelineError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for AttentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which token-type ids mark the visual and textual halves of the sequence.
///
/// The basic scheme reuses BERT's two-row token-type table (0 / 1).
/// The extended scheme needs a six-row table and tags the class,
/// image and separator positions with 4 and the report with 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentScheme {
    #[default]
    Basic,
    Extended,
}

impl SegmentScheme {
    pub fn from_flag(new_segment_ids: bool) -> Self {
        if new_segment_ids { SegmentScheme::Extended } else { SegmentScheme::Basic }
    }

    /// Segment id for the class token, image slots and separator
    pub fn visual_segment(&self) -> u32 {
        match self {
            SegmentScheme::Basic    => 0,
            SegmentScheme::Extended => 4,
        }
    }

    /// Segment id for every position of the text stream
    pub fn text_segment(&self) -> u32 {
        match self {
            SegmentScheme::Basic    => 1,
            SegmentScheme::Extended => 5,
        }
    }

    /// Rows needed in the token-type embedding table
    pub fn type_vocab_size(&self) -> usize {
        match self {
            SegmentScheme::Basic    => 2,
            SegmentScheme::Extended => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_known_modes() {
        assert_eq!("s2s".parse::<AttentionMode>().unwrap(), AttentionMode::Seq2Seq);
        assert_eq!("bi".parse::<AttentionMode>().unwrap(),  AttentionMode::Bidirectional);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let err = "l2r".parse::<AttentionMode>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedMode(m) if m == "l2r"));
    }

    #[test]
    fn test_segment_ids_fit_their_table() {
        for scheme in [SegmentScheme::Basic, SegmentScheme::Extended] {
            assert!((scheme.text_segment() as usize) < scheme.type_vocab_size());
            assert!((scheme.visual_segment() as usize) < scheme.type_vocab_size());
        }
    }
}
