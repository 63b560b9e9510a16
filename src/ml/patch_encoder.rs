// ============================================================
// Layer 5 — Image Patch Encoder
// ============================================================
// Turns a batch of X-rays into `num_image_embeds` feature
// vectors per image, ViT style:
//
//   [B, C, S, S]
//       │  Conv2d, kernel = stride = patch_size
//       ▼
//   [B, img_hidden, S/p, S/p]
//       │  flatten the grid, move features last
//       ▼
//   [B, N, img_hidden]            N = (S/p)²
//       │  keep n evenly spaced patches
//       ▼
//   [B, n, img_hidden]  +  patch indices [B, n] (position ids)
//
// Evenly spaced selection keeps coverage of the whole film
// when n < N.
//
// Reference: Dosovitskiy et al. (2021) ViT §3.1

use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};

use crate::domain::error::{PipelineError, PipelineResult};

#[derive(Config, Debug)]
pub struct PatchEncoderConfig {
    pub image_size:       usize,
    pub patch_size:       usize,
    pub img_hidden:       usize,
    pub num_image_embeds: usize,
    #[config(default = 3)]
    pub channels:         usize,
}

impl PatchEncoderConfig {
    pub fn num_patches(&self) -> usize {
        let side = self.image_size / self.patch_size;
        side * side
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.patch_size == 0 || self.image_size % self.patch_size != 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "image_size ({}) must be a multiple of patch_size ({})",
                self.image_size, self.patch_size
            )));
        }
        if self.num_image_embeds > self.num_patches() {
            return Err(PipelineError::InvalidConfig(format!(
                "num_image_embeds ({}) exceeds the {} available patches",
                self.num_image_embeds,
                self.num_patches()
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PipelineResult<PatchEncoder<B>> {
        self.validate()?;
        let conv = Conv2dConfig::new([self.channels, self.img_hidden], [self.patch_size, self.patch_size])
            .with_stride([self.patch_size, self.patch_size])
            .init(device);
        Ok(PatchEncoder {
            conv,
            channels:         self.channels,
            image_size:       self.image_size,
            num_image_embeds: self.num_image_embeds,
        })
    }
}

#[derive(Module, Debug)]
pub struct PatchEncoder<B: Backend> {
    pub conv:             Conv2d<B>,
    pub channels:         usize,
    pub image_size:       usize,
    pub num_image_embeds: usize,
}

impl<B: Backend> PatchEncoder<B> {
    /// images: [batch, C, S, S] → (features [batch, n, img_hidden], positions [batch, n])
    pub fn forward(&self, images: Tensor<B, 4>) -> PipelineResult<(Tensor<B, 3>, Tensor<B, 2, Int>)> {
        let [batch, channels, height, width] = images.dims();
        if channels != self.channels {
            return Err(PipelineError::ShapeMismatch {
                context:  "image channels",
                expected: self.channels,
                actual:   channels,
            });
        }
        if height != self.image_size || width != self.image_size {
            return Err(PipelineError::ShapeMismatch {
                context:  "image side",
                expected: self.image_size,
                actual:   if height != self.image_size { height } else { width },
            });
        }

        let grid = self.conv.forward(images);
        let [_, hidden, rows, cols] = grid.dims();
        let patches = rows * cols;
        let features = grid.reshape([batch, hidden, patches]).swap_dims(1, 2);

        let n = self.num_image_embeds;
        let picks: Vec<i32> = (0..n).map(|i| (i * patches / n) as i32).collect();
        let device = features.device();
        let picks = Tensor::<B, 1, Int>::from_ints(picks.as_slice(), &device);

        let selected  = features.select(1, picks.clone());
        let positions = picks.unsqueeze::<2>().expand([batch, n]);
        Ok((selected, positions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    #[test]
    fn test_selects_requested_number_of_patches() {
        let device = Default::default();
        let enc = PatchEncoderConfig::new(16, 4, 6, 5).init::<TB>(&device).unwrap();
        let (feats, pos) = enc.forward(Tensor::zeros([2, 3, 16, 16], &device)).unwrap();

        assert_eq!(feats.dims(), [2, 5, 6]);
        assert_eq!(pos.dims(), [2, 5]);
        // 16 patches, 5 picks → 0, 3, 6, 9, 12
        let first: Vec<i64> = pos
            .slice([0..1, 0..5])
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(first, vec![0, 3, 6, 9, 12]);
    }

    #[test]
    fn test_rejects_too_many_image_slots() {
        let cfg = PatchEncoderConfig::new(16, 8, 6, 5);
        assert!(cfg.init::<TB>(&Default::default()).is_err());
    }

    #[test]
    fn test_wrong_image_size_is_shape_error() {
        let device = Default::default();
        let enc = PatchEncoderConfig::new(16, 4, 6, 5).init::<TB>(&device).unwrap();
        let err = enc.forward(Tensor::zeros([1, 3, 8, 8], &device)).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }
}
