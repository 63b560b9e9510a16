// ============================================================
// Layer 4 — Chest X-ray Image Loader
// ============================================================
// Decodes an X-ray from disk into the CHW float buffer the
// patch encoder expects:
//
//   1. Decode (PNG / JPEG) with the `image` crate
//   2. Resize to image_size × image_size (bilinear)
//   3. Convert to RGB; grayscale films are replicated
//      across the three channels
//   4. Normalise each channel: (value/255 - mean) / std
//   5. Lay out channel-major: [R plane][G plane][B plane]
//
// Reference: image crate documentation
//            torchvision ImageNet normalisation constants

use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::traits::ImageSource;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct XrayImageLoader {
    image_size: u32,
    /// Relative record paths are resolved against this directory.
    root:       Option<PathBuf>,
}

impl XrayImageLoader {
    pub fn new(image_size: u32) -> Self {
        Self { image_size, root: None }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        match &self.root {
            Some(root) if p.is_relative() => root.join(p),
            _ => p.to_path_buf(),
        }
    }

    /// Resize, normalise and flatten an already decoded image.
    pub fn to_chw(&self, img: &DynamicImage) -> Vec<f32> {
        let size = self.image_size;
        let rgb  = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        let plane = (size * size) as usize;

        let mut out = vec![0.0f32; 3 * plane];
        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                out[c * plane + i] = (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
        out
    }
}

impl ImageSource for XrayImageLoader {
    fn shape(&self) -> [usize; 3] {
        let s = self.image_size as usize;
        [3, s, s]
    }

    fn load(&self, path: &str) -> PipelineResult<Vec<f32>> {
        let img = image::open(self.resolve(path)).map_err(|e| PipelineError::Image {
            path:   path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.to_chw(&img))
    }
}

/// Constant zero image; for tools that never look at pixels.
pub struct BlankImageSource {
    shape: [usize; 3],
}

impl BlankImageSource {
    pub fn new(image_size: usize) -> Self {
        Self { shape: [3, image_size, image_size] }
    }
}

impl ImageSource for BlankImageSource {
    fn shape(&self) -> [usize; 3] {
        self.shape
    }

    fn load(&self, _path: &str) -> PipelineResult<Vec<f32>> {
        Ok(vec![0.0; self.numel()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_relative_paths_use_root() {
        let loader = XrayImageLoader::new(4).with_root("/data/cxr");
        assert_eq!(loader.resolve("p10/a.jpg"), PathBuf::from("/data/cxr/p10/a.jpg"));
        assert_eq!(loader.resolve("/abs/b.jpg"), PathBuf::from("/abs/b.jpg"));
        assert_eq!(XrayImageLoader::new(4).resolve("c.jpg"), PathBuf::from("c.jpg"));
    }

    #[test]
    fn test_grayscale_film_fills_three_planes() {
        let film = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 6, Luma([255u8])));
        let loader = XrayImageLoader::new(4);
        let out = loader.to_chw(&film);

        assert_eq!(out.len(), loader.numel());
        assert_eq!(loader.shape(), [3, 4, 4]);
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!(out[c * 16..(c + 1) * 16].iter().all(|&v| (v - expected).abs() < 1e-5));
        }
    }

    #[test]
    fn test_round_trip_through_png_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("film.png");
        GrayImage::from_pixel(10, 10, Luma([0u8])).save(&path).unwrap();

        let out = XrayImageLoader::new(5).load(path.to_str().unwrap()).unwrap();
        assert_eq!(out.len(), 3 * 25);
        assert!((out[0] - (-IMAGENET_MEAN[0] / IMAGENET_STD[0])).abs() < 1e-5);
    }

    #[test]
    fn test_missing_file_is_image_error() {
        let err = XrayImageLoader::new(4).load("/no/such/film.jpg").unwrap_err();
        assert!(matches!(err, PipelineError::Image { .. }));
    }
}
