// ============================================================
// Layer 5 — CXR-BERT Model
// ============================================================
// Multimodal BERT: patch features and report tokens share one
// transformer encoder.
//
//   images ──► PatchEncoder ──► ImageEmbeddings ─┐
//   [CLS], [SEP], report ─────► TextEmbeddings ──┴► fuse ──► encoder ──► heads
//
// Heads:
//   MLM — Linear(hidden → vocab) on every position
//   ITM — Linear(hidden → 2) on the pooled [CLS] state
//
// The attention mask comes from the batch (s2s or bi) and is
// turned into Burn's boolean form, where true means "blocked".

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::Bool,
};

use crate::data::batcher::{CxrBatch, MaskBatch};
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::mode::SegmentScheme;
use crate::ml::embeddings::{fuse, FusionInput, ImageEmbeddings, TextEmbeddings, TextEmbeddingsConfig};
use crate::ml::patch_encoder::{PatchEncoder, PatchEncoderConfig};

#[derive(Config, Debug)]
pub struct CxrBertConfig {
    pub vocab_size:              usize,
    pub seq_len:                 usize,
    pub num_image_embeds:        usize,
    #[config(default = 512)]
    pub hidden_size:             usize,
    #[config(default = 8)]
    pub num_heads:               usize,
    #[config(default = 4)]
    pub num_layers:              usize,
    #[config(default = 2048)]
    pub intermediate_size:       usize,
    #[config(default = 0.1)]
    pub dropout:                 f64,
    #[config(default = 512)]
    pub max_position_embeddings: usize,
    #[config(default = 2048)]
    pub img_hidden_sz:           usize,
    #[config(default = 512)]
    pub image_size:              usize,
    #[config(default = 32)]
    pub patch_size:              usize,
    #[config(default = true)]
    pub img_position:            bool,
    #[config(default = false)]
    pub new_segment_ids:         bool,
    #[config(default = true)]
    pub mlm_task:                bool,
    #[config(default = true)]
    pub itm_task:                bool,
}

impl CxrBertConfig {
    fn segments(&self) -> SegmentScheme {
        SegmentScheme::from_flag(self.new_segment_ids)
    }

    fn patch_config(&self) -> PatchEncoderConfig {
        PatchEncoderConfig::new(
            self.image_size,
            self.patch_size,
            self.img_hidden_sz,
            self.num_image_embeds,
        )
    }

    pub fn validate(&self) -> PipelineResult<()> {
        self.patch_config().validate()?;
        if self.num_heads == 0 || self.hidden_size % self.num_heads != 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "hidden_size ({}) must be divisible by num_heads ({})",
                self.hidden_size, self.num_heads
            )));
        }
        if self.seq_len + 2 > self.max_position_embeddings {
            return Err(PipelineError::InvalidConfig(format!(
                "text stream of {} positions exceeds max_position_embeddings ({})",
                self.seq_len + 2,
                self.max_position_embeddings
            )));
        }
        if self.img_position && self.patch_config().num_patches() > self.max_position_embeddings {
            return Err(PipelineError::InvalidConfig(format!(
                "{} image patches exceed max_position_embeddings ({})",
                self.patch_config().num_patches(),
                self.max_position_embeddings
            )));
        }
        if !self.mlm_task && !self.itm_task {
            return Err(PipelineError::InvalidConfig(
                "at least one of mlm_task / itm_task must be enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PipelineResult<CxrBert<B>> {
        self.validate()?;

        let text_embeddings = TextEmbeddingsConfig::new(
            self.vocab_size,
            self.hidden_size,
            self.max_position_embeddings,
            self.segments().type_vocab_size(),
        )
        .with_dropout(self.dropout)
        .init(device);

        let image_embeddings = ImageEmbeddings::new(
            self.img_hidden_sz,
            self.hidden_size,
            self.img_position,
            self.dropout,
            device,
        );

        let layers = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();

        Ok(CxrBert {
            text_embeddings,
            image_embeddings,
            patch_encoder:  self.patch_config().init(device)?,
            layers,
            pooler:         LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            mlm_head:       LinearConfig::new(self.hidden_size, self.vocab_size).init(device),
            itm_head:       LinearConfig::new(self.hidden_size, 2).init(device),
            visual_segment: self.segments().visual_segment() as usize,
            mlm_task:       self.mlm_task,
            itm_task:       self.itm_task,
        })
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn = MultiHeadAttentionConfig::new(self.hidden_size, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        EncoderBlock {
            self_attn,
            ffn_linear1: LinearConfig::new(self.hidden_size, self.intermediate_size).init(device),
            ffn_linear2: LinearConfig::new(self.intermediate_size, self.hidden_size).init(device),
            norm1:       LayerNormConfig::new(self.hidden_size).with_epsilon(1e-12).init(device),
            norm2:       LayerNormConfig::new(self.hidden_size).with_epsilon(1e-12).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }
}

// ─── Encoder Block ───────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `blocked`: [batch, L, L], true where attention is not allowed
    pub fn forward(&self, x: Tensor<B, 3>, blocked: Tensor<B, 3, Bool>) -> Tensor<B, 3> {
        let input = MhaInput::self_attn(x.clone()).mask_attn(blocked);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

// ─── Masks ───────────────────────────────────────────────────────────────────
impl<B: Backend> MaskBatch<B> {
    /// Square boolean mask, true = blocked. Flat key-validity
    /// masks are broadcast over every query row.
    pub fn blocked(&self) -> Tensor<B, 3, Bool> {
        match self {
            MaskBatch::Square(m) => m.clone().equal_elem(0),
            MaskBatch::Flat(m) => {
                let [batch, len] = m.dims();
                m.clone()
                    .unsqueeze_dim::<3>(1)
                    .expand([batch, len, len])
                    .equal_elem(0)
            }
        }
    }
}

// ─── CXR-BERT ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct CxrBert<B: Backend> {
    pub text_embeddings:  TextEmbeddings<B>,
    pub image_embeddings: ImageEmbeddings<B>,
    pub patch_encoder:    PatchEncoder<B>,
    pub layers:           Vec<EncoderBlock<B>>,
    pub pooler:           Linear<B>,
    pub mlm_head:         Linear<B>,
    pub itm_head:         Linear<B>,
    pub visual_segment:   usize,
    pub mlm_task:         bool,
    pub itm_task:         bool,
}

pub struct EncoderOutput<B: Backend> {
    /// [batch, L, hidden]
    pub sequence: Tensor<B, 3>,
    /// tanh(W · h_[CLS]): [batch, hidden]
    pub pooled:   Tensor<B, 2>,
}

pub struct PretrainOutput<B: Backend> {
    /// [batch, L, vocab] when the MLM task is on
    pub mlm_logits: Option<Tensor<B, 3>>,
    /// [batch, 2] when the ITM task is on
    pub itm_logits: Option<Tensor<B, 2>>,
}

impl<B: Backend> CxrBert<B> {
    /// Encode one fused sequence.
    pub fn encode(
        &self,
        class_tokens: Tensor<B, 2, Int>,
        text_ids:     Tensor<B, 2, Int>,
        segments:     Tensor<B, 2, Int>,
        images:       Tensor<B, 4>,
        blocked:      Tensor<B, 3, Bool>,
    ) -> PipelineResult<EncoderOutput<B>> {
        let (image_features, image_positions) = self.patch_encoder.forward(images)?;

        let x = fuse(
            &self.text_embeddings,
            &self.image_embeddings,
            FusionInput {
                class_tokens,
                image_features,
                image_positions,
                text_ids,
                text_segments: segments,
                visual_segment: self.visual_segment,
            },
        )?;

        let [batch, len, hidden] = x.dims();
        let mask_len = blocked.dims()[1];
        if mask_len != len {
            return Err(PipelineError::ShapeMismatch {
                context:  "attention mask length",
                expected: len,
                actual:   mask_len,
            });
        }

        let mut x = x;
        for layer in &self.layers {
            x = layer.forward(x, blocked.clone());
        }

        let cls    = x.clone().slice([0..batch, 0..1, 0..hidden]).reshape([batch, hidden]);
        let pooled = self.pooler.forward(cls).tanh();
        Ok(EncoderOutput { sequence: x, pooled })
    }

    /// Run the enabled pretraining heads on a batch.
    ///
    /// MLM reads the masked input ids; ITM reads the unmasked ITM
    /// ids in a second pass so the matching decision never sees
    /// [MASK] tokens.
    pub fn forward(&self, batch: &CxrBatch<B>) -> PipelineResult<PretrainOutput<B>> {
        let blocked = batch.attention_mask.blocked();

        let mlm_logits = if self.mlm_task {
            let out = self.encode(
                batch.class_tokens.clone(),
                batch.input_ids.clone(),
                batch.segment_ids.clone(),
                batch.images.clone(),
                blocked.clone(),
            )?;
            Some(self.mlm_head.forward(out.sequence))
        } else {
            None
        };

        let itm_logits = if self.itm_task {
            let out = self.encode(
                batch.class_tokens.clone(),
                batch.itm_ids.clone(),
                batch.segment_ids.clone(),
                batch.images.clone(),
                blocked,
            )?;
            Some(self.itm_head.forward(out.pooled))
        } else {
            None
        };

        Ok(PretrainOutput { mlm_logits, itm_logits })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;
    use burn::data::dataset::Dataset;

    use crate::data::batcher::CxrBatcher;
    use crate::data::dataset::tests::{small_config, toy_dataset_with_images};

    type TB = NdArray;

    /// Tiny model matching the toy dataset: seq_len 10, 5 image slots,
    /// 16×16 images cut into 4×4 patches.
    pub(crate) fn tiny_config() -> CxrBertConfig {
        CxrBertConfig::new(15, 10, 5)
            .with_hidden_size(16)
            .with_num_heads(2)
            .with_num_layers(1)
            .with_intermediate_size(32)
            .with_max_position_embeddings(64)
            .with_img_hidden_sz(8)
            .with_image_size(16)
            .with_patch_size(4)
            .with_dropout(0.0)
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model = tiny_config().init::<TB>(&device).unwrap();

        let ds = toy_dataset_with_images(&small_config(), 16);
        let items: Vec<_> = (0..2).filter_map(|i| ds.get(i)).collect();
        let batch = CxrBatcher::<TB>::new(device, [3, 16, 16]).batch(items);

        let out = model.forward(&batch).unwrap();
        assert_eq!(out.mlm_logits.unwrap().dims(), [2, 18, 15]);
        assert_eq!(out.itm_logits.unwrap().dims(), [2, 2]);
    }

    #[test]
    fn test_flat_mask_blocks_padding_columns() {
        let device = Default::default();
        let flat = Tensor::<TB, 1, Int>::from_ints([1, 1, 0], &device).reshape([1, 3]);
        let blocked: Vec<bool> = MaskBatch::Flat(flat).blocked().into_data().to_vec::<bool>().unwrap();
        assert_eq!(
            blocked,
            vec![false, false, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn test_config_rejects_bad_head_split() {
        let cfg = tiny_config().with_num_heads(3);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_config_needs_a_task() {
        let cfg = tiny_config().with_mlm_task(false).with_itm_task(false);
        assert!(cfg.validate().is_err());
    }
}
