// ============================================================
// Layer 2 — PreviewUseCase
// ============================================================
// Runs the data pipeline without a model: loads records and the
// vocabulary, assembles the first N samples and hands them back
// as JSON values (pixels are never included).
//
// Useful for eyeballing masking, padding, segment ids and the
// attention mask of each mode without a GPU.

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use serde_json::Value;
use std::sync::Arc;

use crate::application::train_use_case::TrainConfig;
use crate::data::{dataset::CxrDataset, image::BlankImageSource, loader::JsonlLoader};
use crate::domain::{mode::AttentionMode, traits::RecordSource};

pub struct PreviewUseCase {
    config:       TrainConfig,
    /// Force every sample into this mode; None keeps the mixture.
    mode:         Option<AttentionMode>,
    count:        usize,
    include_mask: bool,
}

impl PreviewUseCase {
    pub fn new(config: TrainConfig, mode: Option<AttentionMode>, count: usize, include_mask: bool) -> Self {
        Self { config, mode, count, include_mask }
    }

    pub fn execute(&self) -> Result<Vec<Value>> {
        let cfg = &self.config;
        let pipeline = match self.mode {
            Some(mode) => cfg.pipeline_config().with_mode(mode),
            None => cfg.pipeline_config(),
        };

        let records = JsonlLoader::new(&cfg.data_path)
            .load_all()
            .with_context(|| format!("Cannot load dataset '{}'", cfg.data_path))?;
        let vocab = Arc::new(cfg.load_vocabulary()?);
        let images = Arc::new(BlankImageSource::new(cfg.image_size));

        let dataset = CxrDataset::new(records.into(), vocab, images, &pipeline)?;

        let mut samples = Vec::with_capacity(self.count);
        for index in 0..self.count.min(dataset.len()) {
            let Some(element) = dataset.get(index) else { break };
            let mut value = serde_json::to_value(&element)?;
            if !self.include_mask {
                if let Value::Object(map) = &mut value {
                    map.remove("attention_mask");
                }
            }
            samples.push(value);
        }

        tracing::info!("Assembled {} preview samples", samples.len());
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, TrainConfig) {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.jsonl");
        fs::write(
            &data,
            concat!(
                r#"{"img": "a.jpg", "text": ["no", "acute", "findings"], "label": "normal"}"#, "\n",
                r#"{"img": "b.jpg", "text": "Right lower lobe opacity.", "label": ["pneumonia"]}"#, "\n",
            ),
        )
        .unwrap();
        let vocab = dir.path().join("vocab.txt");
        fs::write(&vocab, "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\nno\nacute\nfindings\nright\nlower\nlobe\nopacity\n").unwrap();

        let cfg = TrainConfig {
            data_path:        data.display().to_string(),
            vocab_path:       vocab.display().to_string(),
            seq_len:          8,
            num_image_embeds: 4,
            image_size:       8,
            ..TrainConfig::default()
        };
        (dir, cfg)
    }

    #[test]
    fn test_preview_shapes_and_mask_dropped() {
        let (_dir, cfg) = fixture();
        let out = PreviewUseCase::new(cfg, Some(AttentionMode::Seq2Seq), 5, false)
            .execute()
            .unwrap();

        assert_eq!(out.len(), 2);
        for sample in &out {
            assert!(sample.get("attention_mask").is_none());
            assert!(sample.get("image").is_none());
            assert_eq!(sample["mode"], "s2s");
            assert_eq!(sample["input_ids"].as_array().unwrap().len(), 10);
            assert_eq!(sample["labels"].as_array().unwrap().len(), 15);
        }
    }

    #[test]
    fn test_preview_keeps_mask_on_request() {
        let (_dir, cfg) = fixture();
        let out = PreviewUseCase::new(cfg, Some(AttentionMode::Bidirectional), 1, true)
            .execute()
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["attention_mask"]["kind"], "square");
    }
}
