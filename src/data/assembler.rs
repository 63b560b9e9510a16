// ============================================================
// Layer 4 — Sequence Assembler
// ============================================================
// Turns one (image, report tokens) pair into the fixed-shape
// sample the model consumes. With n = num_image_embeds and
// T = report length after truncation, the encoder sees:
//
//   index: 0      1 .. n      n+1    n+2 .. n+T+1   n+T+2   .. L-1
//          [CLS]  img_1..img_n [SEP]  tok_1..tok_T   [SEP]   [PAD]...
//                              └────────── text stream ──────────┘
//
//   L = max_seq_len = seq_len + n + 3
//
// The text stream (input_ids, segment_ids, itm_ids) is always
// seq_len + 2 long; its leading [SEP] is the image/text
// separator. Labels and attention masks cover all L positions.
//
// Attention masks (1 = may attend):
//
//   s2s     — every row sees columns [0, n+2) (class, image,
//             separator); inside the report span [n+2, n+T+3)
//             row i sees columns n+2 ..= i. Nothing else.
//   bi      — v ⊗ v where v marks the n+T+3 real positions.
//   bi + 1D — just v; the encoder broadcasts it over rows.
//
// Truncation silently drops trailing report tokens.
//
// Reference: Dong et al. (2019) UniLM §2.2 (s2s self-attention masks)
//            Devlin et al. (2019) BERT paper §3.1

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;

use crate::data::masking::{MaskingPolicy, IGNORE_INDEX};
use crate::data::vocab::Vocabulary;
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::mode::{AttentionMode, SegmentScheme};

// ─── Configuration ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblerConfig {
    /// Maximum report tokens kept per sample
    pub seq_len:          usize,
    /// Image slots between [CLS] and the text stream
    pub num_image_embeds: usize,
    pub mode:             AttentionMode,
    /// Bidirectional mode only: emit a flat key-validity vector
    /// instead of the square matrix
    pub attn_1d:          bool,
    pub segments:         SegmentScheme,
}

impl AssemblerConfig {
    pub fn max_seq_len(&self) -> usize {
        self.seq_len + self.num_image_embeds + 3
    }

    pub fn text_len(&self) -> usize {
        self.seq_len + 2
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.seq_len == 0 {
            return Err(PipelineError::InvalidConfig("seq_len must be positive".into()));
        }
        if self.num_image_embeds == 0 {
            return Err(PipelineError::InvalidConfig("num_image_embeds must be positive".into()));
        }
        Ok(())
    }
}

// ─── Output ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttentionMask {
    /// Row-major size × size matrix
    Square { size: usize, data: Vec<u32> },
    /// One entry per key position
    Flat { data: Vec<u32> },
}

impl AttentionMask {
    #[cfg(test)]
    pub fn get(&self, row: usize, col: usize) -> u32 {
        match self {
            AttentionMask::Square { size, data } => data[row * size + col],
            AttentionMask::Flat { data } => data[col],
        }
    }

    pub fn as_slice(&self) -> &[u32] {
        match self {
            AttentionMask::Square { data, .. } | AttentionMask::Flat { data } => data,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, AttentionMask::Flat { .. })
    }
}

/// One fully assembled training sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledElement {
    pub mode:           AttentionMode,
    pub class_token:    u32,
    /// Masked text stream: [SEP] tokens [SEP] [PAD]... (seq_len + 2)
    pub input_ids:      Vec<u32>,
    /// MLM targets for every encoder position (max_seq_len)
    pub labels:         Vec<i64>,
    pub attention_mask: AttentionMask,
    /// CHW pixels; left out of previews
    #[serde(skip)]
    pub image:          Vec<f32>,
    pub segment_ids:    Vec<u32>,
    pub is_aligned:     bool,
    /// Unmasked text stream for the ITM branch (seq_len + 2)
    pub itm_ids:        Vec<u32>,
}

// ─── Assembler ───────────────────────────────────────────────────────────────
pub struct SequenceAssembler {
    config:  AssemblerConfig,
    vocab:   Arc<Vocabulary>,
    masking: MaskingPolicy,
}

impl SequenceAssembler {
    pub fn new(config: AssemblerConfig, vocab: Arc<Vocabulary>) -> PipelineResult<Self> {
        config.validate()?;
        let masking = MaskingPolicy::new(vocab.special().mask, vocab.len());
        Ok(Self { config, vocab, masking })
    }

    pub fn assemble<R: Rng + ?Sized>(
        &self,
        image:      Vec<f32>,
        mut tokens: Vec<String>,
        is_aligned: bool,
        rng:        &mut R,
    ) -> AssembledElement {
        let cfg     = &self.config;
        let special = self.vocab.special();

        tokens.truncate(cfg.seq_len);
        let encoded = self.vocab.encode(tokens.as_slice());
        let masked  = self.masking.mask(&encoded, rng);

        let pad_len = cfg.seq_len - encoded.len();

        let input_ids = wrap_and_pad(&masked.token_ids, special.sep, special.pad, pad_len);
        let itm_ids   = wrap_and_pad(&encoded, special.sep, special.pad, pad_len);

        // [CLS] + image slots, then [SEP] text [SEP] padding
        let mut labels = Vec::with_capacity(cfg.max_seq_len());
        labels.extend(std::iter::repeat(IGNORE_INDEX).take(cfg.num_image_embeds + 1));
        labels.push(IGNORE_INDEX);
        labels.extend_from_slice(&masked.recovery_labels);
        labels.push(IGNORE_INDEX);
        labels.extend(std::iter::repeat(IGNORE_INDEX).take(pad_len));

        let segment_ids    = vec![cfg.segments.text_segment(); cfg.text_len()];
        let attention_mask = self.attention_mask(encoded.len());

        debug_assert_eq!(input_ids.len(), cfg.text_len());
        debug_assert_eq!(labels.len(), cfg.max_seq_len());

        AssembledElement {
            mode: cfg.mode,
            class_token: special.cls,
            input_ids,
            labels,
            attention_mask,
            image,
            segment_ids,
            is_aligned,
            itm_ids,
        }
    }

    /// Mask for a report of `report_len` tokens (after truncation).
    fn attention_mask(&self, report_len: usize) -> AttentionMask {
        let n     = self.config.num_image_embeds;
        let size  = self.config.max_seq_len();
        let valid = n + report_len + 3;

        match (self.config.mode, self.config.attn_1d) {
            (AttentionMode::Seq2Seq, _) => {
                let mut data = vec![0u32; size * size];
                let prefix = n + 2;
                for row in data.chunks_mut(size) {
                    row[..prefix].fill(1);
                }
                // report tokens plus the closing [SEP]
                let span_end = (prefix + report_len + 1).min(size);
                for i in prefix..span_end {
                    data[i * size + prefix..=i * size + i].fill(1);
                }
                AttentionMask::Square { size, data }
            }
            (AttentionMode::Bidirectional, false) => {
                let mut data = vec![0u32; size * size];
                for i in 0..valid {
                    data[i * size..i * size + valid].fill(1);
                }
                AttentionMask::Square { size, data }
            }
            (AttentionMode::Bidirectional, true) => {
                let mut data = vec![0u32; size];
                data[..valid].fill(1);
                AttentionMask::Flat { data }
            }
        }
    }
}

fn wrap_and_pad(ids: &[u32], sep: u32, pad: u32, pad_len: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(ids.len() + 2 + pad_len);
    out.push(sep);
    out.extend_from_slice(ids);
    out.push(sep);
    out.extend(std::iter::repeat(pad).take(pad_len));
    out
}
