// ============================================================
// Layer 4 — CXR Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks assembled samples
// into the eight tensors of one training batch.
//
//   class_tokens   [B, 1]                   Int
//   input_ids      [B, seq_len + 2]         Int   (masked)
//   labels         [B, L]                   Int   (-100 = ignore)
//   attention_mask [B, L, L] or [B, L]      Int
//   images         [B, C, H, W]             Float
//   segment_ids    [B, seq_len + 2]         Int
//   is_aligned     [B]                      Int   (1 = true pair)
//   itm_ids        [B, seq_len + 2]         Int   (unmasked)
//
// Every sample is already padded to the same length, so each
// field is flattened sample by sample and reshaped once.
// Sample order inside the batch is preserved.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::assembler::{AssembledElement, AttentionMask};

/// Attention masks keep the shape the assembler produced.
#[derive(Debug, Clone)]
pub enum MaskBatch<B: Backend> {
    /// [batch, L, L], one row per query
    Square(Tensor<B, 3, Int>),
    /// [batch, L], key validity only
    Flat(Tensor<B, 2, Int>),
}

#[derive(Debug, Clone)]
pub struct CxrBatch<B: Backend> {
    pub class_tokens:   Tensor<B, 2, Int>,
    pub input_ids:      Tensor<B, 2, Int>,
    pub labels:         Tensor<B, 2, Int>,
    pub attention_mask: MaskBatch<B>,
    pub images:         Tensor<B, 4>,
    pub segment_ids:    Tensor<B, 2, Int>,
    pub is_aligned:     Tensor<B, 1, Int>,
    pub itm_ids:        Tensor<B, 2, Int>,
}

#[derive(Clone, Debug)]
pub struct CxrBatcher<B: Backend> {
    device:      B::Device,
    /// [channels, height, width] of every image buffer
    image_shape: [usize; 3],
}

impl<B: Backend> CxrBatcher<B> {
    pub fn new(device: B::Device, image_shape: [usize; 3]) -> Self {
        Self { device, image_shape }
    }

    fn ints_2d<T, F>(&self, items: &[AssembledElement], width: usize, field: F) -> Tensor<B, 2, Int>
    where
        T: Copy + Into<i64>,
        F: Fn(&AssembledElement) -> &[T],
    {
        let flat: Vec<i32> = items
            .iter()
            .flat_map(|s| field(s).iter().map(|&x| Into::<i64>::into(x) as i32))
            .collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([items.len(), width])
    }

    fn stack_masks(&self, items: &[AssembledElement], size: usize) -> MaskBatch<B> {
        let batch = items.len();

        if items.iter().all(|s| s.attention_mask.is_flat()) {
            let flat: Vec<i32> = items
                .iter()
                .flat_map(|s| s.attention_mask.as_slice().iter().map(|&x| x as i32))
                .collect();
            let t = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device);
            return MaskBatch::Flat(t.reshape([batch, size]));
        }

        // Mixed batch: broadcast flat masks over every query row.
        let mut flat: Vec<i32> = Vec::with_capacity(batch * size * size);
        for s in items {
            match &s.attention_mask {
                AttentionMask::Square { data, .. } => flat.extend(data.iter().map(|&x| x as i32)),
                AttentionMask::Flat { data } => {
                    for _ in 0..size {
                        flat.extend(data.iter().map(|&x| x as i32));
                    }
                }
            }
        }
        let t = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device);
        MaskBatch::Square(t.reshape([batch, size, size]))
    }
}

impl<B: Backend> Batcher<AssembledElement, CxrBatch<B>> for CxrBatcher<B> {
    fn batch(&self, items: Vec<AssembledElement>) -> CxrBatch<B> {
        let batch_size = items.len();
        let text_len   = items[0].input_ids.len();
        let full_len   = items[0].labels.len();
        let [c, h, w]  = self.image_shape;

        let class_tokens: Vec<i32> = items.iter().map(|s| s.class_token as i32).collect();
        let class_tokens = Tensor::<B, 1, Int>::from_ints(class_tokens.as_slice(), &self.device)
            .reshape([batch_size, 1]);

        let input_ids   = self.ints_2d(&items, text_len, |s| s.input_ids.as_slice());
        let segment_ids = self.ints_2d(&items, text_len, |s| s.segment_ids.as_slice());
        let itm_ids     = self.ints_2d(&items, text_len, |s| s.itm_ids.as_slice());
        let labels      = self.ints_2d(&items, full_len, |s| s.labels.as_slice());

        let attention_mask = self.stack_masks(&items, full_len);

        let pixels: Vec<f32> = items.iter().flat_map(|s| s.image.iter().copied()).collect();
        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([batch_size, c, h, w]);

        let aligned: Vec<i32> = items.iter().map(|s| i32::from(s.is_aligned)).collect();
        let is_aligned = Tensor::<B, 1, Int>::from_ints(aligned.as_slice(), &self.device);

        CxrBatch {
            class_tokens,
            input_ids,
            labels,
            attention_mask,
            images,
            segment_ids,
            is_aligned,
            itm_ids,
        }
    }
}
