// ============================================================
// Layer 4 — CXR Pretraining Dataset
// ============================================================
// Implements Burn's Dataset trait on top of the immutable
// record list. Nothing is cached: every get() re-runs
//
//   PairSampler       → aligned or substituted report
//   Vocabulary        → word pieces
//   ImageSource       → pixels
//   mode choice       → s2s with probability s2s_prob, else bi
//   SequenceAssembler → masked, padded, mask-annotated sample
//
// so each epoch sees fresh negatives and fresh MLM masks.
//
// Randomness: every access gets its own ChaCha stream, keyed by
// (seed, access number). The access number is an atomic counter,
// which keeps the dataset lock-free and shareable across
// data-loader workers while single-worker runs stay exactly
// reproducible.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            rand_chacha documentation (set_stream)

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use burn::data::dataset::Dataset;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::data::assembler::{AssembledElement, AssemblerConfig, SequenceAssembler};
use crate::data::pair_sampler::PairSampler;
use crate::data::vocab::Vocabulary;
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::mode::{AttentionMode, SegmentScheme};
use crate::domain::record::Record;
use crate::domain::traits::ImageSource;

// ─── Pipeline Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub seq_len:          usize,
    pub num_image_embeds: usize,
    /// Probability that a sample uses the s2s mask
    pub s2s_prob:         f64,
    /// Probability that a sample uses the bidirectional mask
    pub bi_prob:          f64,
    pub attn_1d:          bool,
    pub new_segment_ids:  bool,
    pub seed:             u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seq_len:          253,
            num_image_embeds: 100,
            s2s_prob:         0.0,
            bi_prob:          1.0,
            attn_1d:          false,
            new_segment_ids:  false,
            seed:             42,
        }
    }
}

impl PipelineConfig {
    /// Force every sample into one mode.
    pub fn with_mode(mut self, mode: AttentionMode) -> Self {
        let s2s = mode == AttentionMode::Seq2Seq;
        self.s2s_prob = if s2s { 1.0 } else { 0.0 };
        self.bi_prob  = 1.0 - self.s2s_prob;
        self
    }

    pub fn segments(&self) -> SegmentScheme {
        SegmentScheme::from_flag(self.new_segment_ids)
    }

    pub fn max_seq_len(&self) -> usize {
        self.assembler_config(AttentionMode::Bidirectional).max_seq_len()
    }

    pub fn assembler_config(&self, mode: AttentionMode) -> AssemblerConfig {
        AssemblerConfig {
            seq_len:          self.seq_len,
            num_image_embeds: self.num_image_embeds,
            mode,
            attn_1d:          self.attn_1d,
            segments:         self.segments(),
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let valid_prob = |p: f64| (0.0..=1.0).contains(&p);
        if !valid_prob(self.s2s_prob) || !valid_prob(self.bi_prob) {
            return Err(PipelineError::InvalidConfig(
                "mode probabilities must lie in [0, 1]".into(),
            ));
        }
        if (self.s2s_prob + self.bi_prob - 1.0).abs() > 1e-6 {
            return Err(PipelineError::InvalidConfig(format!(
                "s2s_prob ({}) + bi_prob ({}) must equal 1",
                self.s2s_prob, self.bi_prob
            )));
        }
        // 1-D masks exist only for the bidirectional mode
        if self.attn_1d && self.s2s_prob > 0.0 {
            return Err(PipelineError::InvalidConfig(
                "attn_1d requires s2s_prob = 0".into(),
            ));
        }
        self.assembler_config(AttentionMode::Bidirectional).validate()
    }
}

// ─── Dataset ─────────────────────────────────────────────────────────────────
pub struct CxrDataset {
    records:  Arc<[Record]>,
    vocab:    Arc<Vocabulary>,
    images:   Arc<dyn ImageSource>,
    sampler:  Arc<PairSampler>,
    s2s:      SequenceAssembler,
    bi:       SequenceAssembler,
    s2s_prob: f64,
    seed:     u64,
    accesses: AtomicU64,
}

impl CxrDataset {
    pub fn new(
        records: Arc<[Record]>,
        vocab:   Arc<Vocabulary>,
        images:  Arc<dyn ImageSource>,
        config:  &PipelineConfig,
    ) -> PipelineResult<Self> {
        config.validate()?;
        if records.is_empty() {
            return Err(PipelineError::InvalidConfig("dataset has no records".into()));
        }
        let s2s = SequenceAssembler::new(config.assembler_config(AttentionMode::Seq2Seq), vocab.clone())?;
        let bi  = SequenceAssembler::new(config.assembler_config(AttentionMode::Bidirectional), vocab.clone())?;

        tracing::info!(
            "Dataset ready: {} records, s2s {} vs bidirectional {}",
            records.len(),
            config.s2s_prob,
            config.bi_prob
        );

        Ok(Self {
            records,
            vocab,
            images,
            sampler: Arc::new(PairSampler::new()),
            s2s,
            bi,
            s2s_prob: config.s2s_prob,
            seed: config.seed,
            accesses: AtomicU64::new(0),
        })
    }

    /// Shared handle, so the exhaustion counter stays readable
    /// after the dataset moves into a data loader.
    pub fn sampler(&self) -> Arc<PairSampler> {
        self.sampler.clone()
    }

    /// Build the sample for `index` from an explicit random stream.
    pub fn sample_with<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> AssembledElement {
        let pair = self.sampler.sample(&self.records, index, rng);
        if !pair.is_aligned {
            tracing::trace!("record {index}: '{}' paired with a '{}' report", pair.image, pair.label);
        }

        let tokens = self.vocab.tokenize(pair.text).unwrap_or_else(|e| {
            tracing::warn!("Cannot tokenise report for '{}': {e}", pair.image);
            Vec::new()
        });

        let image = self.images.load(pair.image).unwrap_or_else(|e| {
            tracing::warn!("{e}; substituting a blank image");
            vec![0.0; self.images.numel()]
        });

        let assembler = if rng.gen_bool(self.s2s_prob) { &self.s2s } else { &self.bi };
        assembler.assemble(image, tokens, pair.is_aligned, rng)
    }

    fn access_rng(&self) -> ChaCha8Rng {
        let access = self.accesses.fetch_add(1, Ordering::Relaxed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(access);
        rng
    }
}

impl Dataset<AssembledElement> for CxrDataset {
    fn get(&self, index: usize) -> Option<AssembledElement> {
        if index >= self.records.len() {
            return None;
        }
        let mut rng = self.access_rng();
        Some(self.sample_with(index, &mut rng))
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
