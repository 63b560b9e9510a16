// ============================================================
// Layer 3 — Record Domain Types
// ============================================================
// A Record is one line of the input JSONL file:
//   {"img": "p10/s5/a.jpg", "text": ["no", "acute", "findings"], "label": "normal"}
//
// Records are loaded once and never mutated. Everything derived
// from a record (the sampled pair, the masked text, the tensors)
// is rebuilt on every access so each epoch sees a fresh
// augmentation.
//
// Reference: Rust Book §5 (Structs and Methods)
//            Rust Book §10 (Lifetimes)

use serde::{Deserialize, Serialize};

/// Label assigned when the source line carries an empty label list.
pub const FALLBACK_LABEL: &str = "Others";

/// Report text as it appears in the source file.
///
/// Most corpora ship reports already split into word pieces;
/// some ship the raw sentence and leave tokenisation to us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportText {
    Tokens(Vec<String>),
    Raw(String),
}

/// One (image, report, label) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Path to the chest X-ray on disk
    pub image: String,

    /// The radiology report
    pub text: ReportText,

    /// Finding label(s), already normalised to a single string
    pub label: String,
}

impl Record {
    pub fn new(image: impl Into<String>, text: ReportText, label: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            text,
            label: label.into(),
        }
    }
}

/// An image paired with either its own report or a substituted one.
///
/// Borrows from the dataset: sampling a pair never copies report text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairedExample<'a> {
    pub image:      &'a str,
    pub text:       &'a ReportText,
    pub label:      &'a str,
    /// true  → text belongs to image
    /// false → text was taken from a record with a different label
    pub is_aligned: bool,
}

impl<'a> PairedExample<'a> {
    /// The true pair for a record.
    pub fn aligned(record: &'a Record) -> Self {
        Self {
            image:      &record.image,
            text:       &record.text,
            label:      &record.label,
            is_aligned: true,
        }
    }

    /// The record's image with another record's report.
    pub fn misaligned(record: &'a Record, other: &'a Record) -> Self {
        Self {
            image:      &record.image,
            text:       &other.text,
            label:      &other.label,
            is_aligned: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_text_parses_both_shapes() {
        let tokens: ReportText = serde_json::from_str(r#"["no", "effusion"]"#).unwrap();
        assert_eq!(tokens, ReportText::Tokens(vec!["no".into(), "effusion".into()]));

        let raw: ReportText = serde_json::from_str(r#""No effusion.""#).unwrap();
        assert_eq!(raw, ReportText::Raw("No effusion.".into()));
    }

    #[test]
    fn test_misaligned_keeps_original_image() {
        let a = Record::new("a.jpg", ReportText::Raw("clear".into()), "normal");
        let b = Record::new("b.jpg", ReportText::Raw("opacity".into()), "pneumonia");
        let pair = PairedExample::misaligned(&a, &b);
        assert_eq!(pair.image, "a.jpg");
        assert_eq!(pair.label, "pneumonia");
        assert!(!pair.is_aligned);
    }
}
