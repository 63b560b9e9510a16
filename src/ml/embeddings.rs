// ============================================================
// Layer 5 — Embedding Fusion
// ============================================================
// Builds the encoder input from four streams:
//
//   [CLS] │ image patch features │ [SEP] │ report tokens + padding
//     1   │          n           │   1   │       seq_len + 1
//
// Text-like streams (class, separator, report) go through
// TextEmbeddings: word + position + token-type, LayerNorm,
// dropout. Positions restart at 0 for the class token; the
// separator and report share one position range, so the text
// stream [SEP] tok... keeps BERT's usual numbering.
//
// Image features go through ImageEmbeddings: a linear
// projection to hidden_size, plus token-type (and optionally
// position) embeddings, then LayerNorm and dropout.
//
// ImageEmbeddings owns only its projection and dropout. The
// token-type table, position table and LayerNorm belong to
// TextEmbeddings and are passed in by reference on every
// forward, so both streams read (and train) the very same
// parameters.
//
// Reference: Kiela et al. (2019) MMBT §3
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::domain::error::{PipelineError, PipelineResult};

// ─── Text ────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct TextEmbeddingsConfig {
    pub vocab_size:              usize,
    pub hidden_size:             usize,
    pub max_position_embeddings: usize,
    pub type_vocab_size:         usize,
    #[config(default = 0.1)]
    pub dropout:                 f64,
    #[config(default = 1e-12)]
    pub layer_norm_eps:          f64,
}

impl TextEmbeddingsConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TextEmbeddings<B> {
        TextEmbeddings {
            word:       EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device),
            position:   EmbeddingConfig::new(self.max_position_embeddings, self.hidden_size).init(device),
            token_type: EmbeddingConfig::new(self.type_vocab_size, self.hidden_size).init(device),
            layer_norm: LayerNormConfig::new(self.hidden_size)
                .with_epsilon(self.layer_norm_eps)
                .init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct TextEmbeddings<B: Backend> {
    pub word:       Embedding<B>,
    pub position:   Embedding<B>,
    pub token_type: Embedding<B>,
    pub layer_norm: LayerNorm<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> TextEmbeddings<B> {
    /// ids, segments: [batch, len] → [batch, len, hidden]
    ///
    /// Position ids run from `first_position` to `first_position + len`.
    pub fn forward(
        &self,
        ids:            Tensor<B, 2, Int>,
        segments:       Tensor<B, 2, Int>,
        first_position: usize,
    ) -> Tensor<B, 3> {
        let [batch, len] = ids.dims();
        let device = ids.device();

        let positions = Tensor::<B, 1, Int>::arange(
            first_position as i64..(first_position + len) as i64,
            &device,
        )
        .unsqueeze::<2>()
        .expand([batch, len]);

        let x = self.word.forward(ids)
            + self.position.forward(positions)
            + self.token_type.forward(segments);
        self.dropout.forward(self.layer_norm.forward(x))
    }
}

// ─── Image ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ImageEmbeddings<B: Backend> {
    pub projection:   Linear<B>,
    pub dropout:      Dropout,
    /// Width of the incoming patch features
    pub img_hidden:   usize,
    pub use_position: bool,
}

impl<B: Backend> ImageEmbeddings<B> {
    pub fn new(
        img_hidden:   usize,
        hidden_size:  usize,
        use_position: bool,
        dropout:      f64,
        device:       &B::Device,
    ) -> Self {
        Self {
            projection: LinearConfig::new(img_hidden, hidden_size).init(device),
            dropout:    DropoutConfig::new(dropout).init(),
            img_hidden,
            use_position,
        }
    }

    /// features: [batch, n, img_hidden], positions/segments: [batch, n]
    ///
    /// `shared` supplies the token-type table, position table and
    /// LayerNorm.
    pub fn forward(
        &self,
        features:  Tensor<B, 3>,
        positions: Tensor<B, 2, Int>,
        segments:  Tensor<B, 2, Int>,
        shared:    &TextEmbeddings<B>,
    ) -> PipelineResult<Tensor<B, 3>> {
        let width = features.dims()[2];
        if width != self.img_hidden {
            return Err(PipelineError::ShapeMismatch {
                context:  "image embedding input width",
                expected: self.img_hidden,
                actual:   width,
            });
        }

        let mut x = self.projection.forward(features) + shared.token_type.forward(segments);
        if self.use_position {
            x = x + shared.position.forward(positions);
        }
        Ok(self.dropout.forward(shared.layer_norm.forward(x)))
    }
}

// ─── Fusion ──────────────────────────────────────────────────────────────────
/// Raw inputs for one fused encoder sequence.
pub struct FusionInput<B: Backend> {
    /// [batch, 1]
    pub class_tokens:   Tensor<B, 2, Int>,
    /// [batch, n, img_hidden]
    pub image_features: Tensor<B, 3>,
    /// [batch, n]
    pub image_positions: Tensor<B, 2, Int>,
    /// Text stream [SEP] tokens [SEP] [PAD]...: [batch, seq_len + 2]
    pub text_ids:       Tensor<B, 2, Int>,
    /// [batch, seq_len + 2]
    pub text_segments:  Tensor<B, 2, Int>,
    /// Token-type id for class, image and separator positions
    pub visual_segment: usize,
}

/// Concatenate class, image, separator and report embeddings.
///
/// Output: [batch, 1 + n + seq_len + 2, hidden]
pub fn fuse<B: Backend>(
    text:   &TextEmbeddings<B>,
    image:  &ImageEmbeddings<B>,
    input:  FusionInput<B>,
) -> PipelineResult<Tensor<B, 3>> {
    let [batch, text_len] = input.text_ids.dims();
    let [_, num_images, _] = input.image_features.dims();
    let device = input.text_ids.device();
    let visual = input.visual_segment as i64;

    if text_len < 2 {
        return Err(PipelineError::ShapeMismatch {
            context:  "text stream length",
            expected: 2,
            actual:   text_len,
        });
    }

    let visual_seg = |len: usize| Tensor::<B, 2, Int>::full([batch, len], visual, &device);

    let cls_out = text.forward(input.class_tokens, visual_seg(1), 0);
    let img_out = image.forward(
        input.image_features,
        input.image_positions,
        visual_seg(num_images),
        text,
    )?;

    let sep_ids  = input.text_ids.clone().slice([0..batch, 0..1]);
    let sep_out  = text.forward(sep_ids, visual_seg(1), 0);

    let body_ids = input.text_ids.slice([0..batch, 1..text_len]);
    let body_seg = input.text_segments.slice([0..batch, 1..text_len]);
    let body_out = text.forward(body_ids, body_seg, 1);

    Ok(Tensor::cat(vec![cls_out, img_out, sep_out, body_out], 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn tables(device: &<TB as Backend>::Device) -> (TextEmbeddings<TB>, ImageEmbeddings<TB>) {
        let text  = TextEmbeddingsConfig::new(30, 8, 64, 2).with_dropout(0.0).init::<TB>(device);
        let image = ImageEmbeddings::<TB>::new(6, 8, true, 0.0, device);
        (text, image)
    }

    fn input(device: &<TB as Backend>::Device, img_width: usize) -> FusionInput<TB> {
        FusionInput {
            class_tokens:    Tensor::<TB, 2, Int>::full([2, 1], 2, device),
            image_features:  Tensor::<TB, 3>::ones([2, 5, img_width], device),
            image_positions: Tensor::<TB, 1, Int>::arange(0..5, device).unsqueeze::<2>().expand([2, 5]),
            text_ids:        Tensor::<TB, 2, Int>::ones([2, 12], device),
            text_segments:   Tensor::<TB, 2, Int>::ones([2, 12], device),
            visual_segment:  0,
        }
    }

    #[test]
    fn test_fused_length_matches_assembled_layout() {
        let device = Default::default();
        let (text, image) = tables(&device);
        let out = fuse(&text, &image, input(&device, 6)).unwrap();
        // 1 class + 5 image + 1 separator + 11 report/padding = 18
        assert_eq!(out.dims(), [2, 18, 8]);
    }

    #[test]
    fn test_wrong_feature_width_fails_fast() {
        let device = Default::default();
        let (text, image) = tables(&device);
        let err = fuse(&text, &image, input(&device, 7)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ShapeMismatch { expected: 6, actual: 7, .. }
        ));
    }
}
