// ============================================================
// Layer 4 — Vocabulary Adapter
// ============================================================
// Wraps a token → id mapping and answers the handful of
// questions the pipeline asks of it:
//
//   - What is the id of this word piece? (unknown → [UNK])
//   - What are the ids of [MASK], [PAD], [SEP], [CLS]?
//   - How many ids exist? (random replacement draws from 0..len)
//
// Which strings count as "special" depends on the pretrained
// model the vocabulary came from (BERT uses [UNK], ALBERT uses
// <unk>). That choice is made once, through VocabVariant, when
// the vocabulary is built, never per sample.
//
// Reference: Devlin et al. (2019) BERT paper §3.1
//            Rust Book §8 (Hash Maps)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::record::ReportText;

// ─── Variant Registry ────────────────────────────────────────────────────────
/// Pretrained text backbones the pipeline knows how to pair with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VocabVariant {
    BertBaseUncased,
    ClinicalBert,
    BertSmall,
    AlbertBaseV2,
}

/// The literal strings a variant uses for its special tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub unk:  &'static str,
    pub pad:  &'static str,
    pub sep:  &'static str,
    pub cls:  &'static str,
    pub mask: &'static str,
}

const BERT_SPECIALS: SpecialTokens = SpecialTokens {
    unk:  "[UNK]",
    pad:  "[PAD]",
    sep:  "[SEP]",
    cls:  "[CLS]",
    mask: "[MASK]",
};

const ALBERT_SPECIALS: SpecialTokens = SpecialTokens {
    unk:  "<unk>",
    pad:  "<pad>",
    sep:  "[SEP]",
    cls:  "[CLS]",
    mask: "[MASK]",
};

impl VocabVariant {
    /// Resolve a model name as it appears on the command line.
    pub fn from_name(name: &str) -> PipelineResult<Self> {
        match name {
            "bert-base-uncased" => Ok(VocabVariant::BertBaseUncased),
            "ClinicalBERT" | "emilyalsentzer/Bio_ClinicalBERT" => Ok(VocabVariant::ClinicalBert),
            "bert_small" | "google/bert_uncased_L-4_H-512_A-8" => Ok(VocabVariant::BertSmall),
            "albert-base-v2" => Ok(VocabVariant::AlbertBaseV2),
            other => Err(PipelineError::Vocabulary(format!(
                "unknown model variant '{other}'"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VocabVariant::BertBaseUncased => "bert-base-uncased",
            VocabVariant::ClinicalBert    => "ClinicalBERT",
            VocabVariant::BertSmall       => "google/bert_uncased_L-4_H-512_A-8",
            VocabVariant::AlbertBaseV2    => "albert-base-v2",
        }
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        match self {
            VocabVariant::AlbertBaseV2 => ALBERT_SPECIALS,
            _ => BERT_SPECIALS,
        }
    }

    /// Whether raw text should be lower-cased before whitespace splitting
    pub fn lowercase(&self) -> bool {
        !matches!(self, VocabVariant::ClinicalBert)
    }
}

// ─── Vocabulary ──────────────────────────────────────────────────────────────
/// Resolved special-token ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialIds {
    pub unk:  u32,
    pub pad:  u32,
    pub sep:  u32,
    pub cls:  u32,
    pub mask: u32,
}

pub struct Vocabulary {
    stoi:      HashMap<String, u32>,
    special:   SpecialIds,
    variant:   VocabVariant,
    /// Present when the vocabulary came from a tokenizer.json;
    /// used to split raw-text reports into word pieces.
    tokenizer: Option<Tokenizer>,
    size:      usize,
}

impl Vocabulary {
    /// Build a vocabulary from a token → id map.
    ///
    /// Fails if any of the variant's special tokens is missing,
    /// since every assembled sample needs all of them.
    pub fn new(
        stoi:      HashMap<String, u32>,
        variant:   VocabVariant,
        tokenizer: Option<Tokenizer>,
    ) -> PipelineResult<Self> {
        let names = variant.special_tokens();
        let lookup = |tok: &str| {
            stoi.get(tok).copied().ok_or_else(|| {
                PipelineError::Vocabulary(format!(
                    "special token '{tok}' missing from {} vocabulary",
                    variant.name()
                ))
            })
        };
        let special = SpecialIds {
            unk:  lookup(names.unk)?,
            pad:  lookup(names.pad)?,
            sep:  lookup(names.sep)?,
            cls:  lookup(names.cls)?,
            mask: lookup(names.mask)?,
        };

        // Ids are not guaranteed to be dense (hand-built vocabularies
        // often skip ranges), so the id space is max id + 1.
        let size = stoi.values().copied().max().map_or(0, |m| m as usize + 1);

        Ok(Self { stoi, special, variant, tokenizer, size })
    }

    /// Number of ids random replacement may draw from
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn special(&self) -> SpecialIds {
        self.special
    }

    /// Id of a single word piece; unknown pieces map to [UNK].
    pub fn id(&self, token: &str) -> u32 {
        self.stoi.get(token).copied().unwrap_or(self.special.unk)
    }

    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        tokens.iter().map(|t| self.id(t.as_ref())).collect()
    }

    /// Split a report into word pieces.
    ///
    /// Pre-tokenised reports pass through untouched. Raw text goes
    /// through the loaded tokenizer when there is one, otherwise a
    /// whitespace split with edge punctuation stripped.
    pub fn tokenize(&self, text: &ReportText) -> PipelineResult<Vec<String>> {
        match text {
            ReportText::Tokens(tokens) => Ok(tokens.clone()),
            ReportText::Raw(raw) => match &self.tokenizer {
                Some(tok) => {
                    let enc = tok
                        .encode(raw.as_str(), false)
                        .map_err(|e| PipelineError::Vocabulary(format!("tokenisation failed: {e}")))?;
                    Ok(enc.get_tokens().to_vec())
                }
                None => Ok(whitespace_tokens(raw, self.variant.lowercase())),
            },
        }
    }
}

fn whitespace_tokens(raw: &str, lowercase: bool) -> Vec<String> {
    raw.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(|w| if lowercase { w.to_lowercase() } else { w.to_string() })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Small BERT-style vocabulary shared by the data-layer tests.
    pub(crate) fn toy_vocab() -> Vocabulary {
        let words = [
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]",
            "no", "acute", "findings", "effusion", "opacity",
            "right", "lower", "lobe", "pneumonia", "normal",
        ];
        let stoi = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.to_string(), i as u32))
            .collect();
        Vocabulary::new(stoi, VocabVariant::BertBaseUncased, None).unwrap()
    }

    #[test]
    fn test_unknown_token_maps_to_unk() {
        let v = toy_vocab();
        assert_eq!(v.id("cardiomegaly"), v.special().unk);
        assert_eq!(v.encode(&["no", "zzz"]), vec![5, 1]);
    }

    #[test]
    fn test_special_ids_resolved() {
        let v = toy_vocab();
        let s = v.special();
        assert_eq!((s.pad, s.unk, s.cls, s.sep, s.mask), (0, 1, 2, 3, 4));
        assert_eq!(v.len(), 15);
    }

    #[test]
    fn test_missing_special_token_is_an_error() {
        let stoi: HashMap<String, u32> = [("[PAD]".to_string(), 0)].into_iter().collect();
        assert!(Vocabulary::new(stoi, VocabVariant::BertSmall, None).is_err());
    }

    #[test]
    fn test_albert_uses_angle_bracket_specials() {
        let names = VocabVariant::from_name("albert-base-v2").unwrap().special_tokens();
        assert_eq!(names.unk, "<unk>");
        assert_eq!(names.pad, "<pad>");
    }

    #[test]
    fn test_registry_aliases() {
        assert_eq!(VocabVariant::from_name("bert_small").unwrap(), VocabVariant::BertSmall);
        assert!(VocabVariant::from_name("gpt2").is_err());
    }

    #[test]
    fn test_raw_text_whitespace_fallback() {
        let v = toy_vocab();
        let tokens = v.tokenize(&ReportText::Raw("No acute findings.".into())).unwrap();
        assert_eq!(tokens, vec!["no", "acute", "findings"]);
    }
}
