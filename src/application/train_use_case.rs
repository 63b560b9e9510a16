// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a pretraining run in order:
//
//   Step 1: Load JSONL records         (Layer 4 - data)
//   Step 2: Load the vocabulary        (Layer 6 - infra)
//   Step 3: Split train/validation     (Layer 4 - data)
//   Step 4: Build datasets             (Layer 4 - data)
//   Step 5: Save configs + vocabulary  (Layer 6 - infra)
//   Step 6: Run training loop          (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::{
    dataset::{CxrDataset, PipelineConfig},
    image::XrayImageLoader,
    loader::JsonlLoader,
    splitter::split_train_val,
    vocab::{VocabVariant, Vocabulary},
};
use crate::domain::traits::{ImageSource, RecordSource};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    vocab_store::VocabStore,
};
use crate::ml::model::CxrBertConfig;
use crate::ml::trainer::{run_training, TrainingRun};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every knob of a run. Saved as train_config.json beside the
// checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_path:         String,
    pub image_root:        Option<String>,
    pub vocab_path:        String,
    /// Registry name of the text backbone, e.g. "bert-base-uncased"
    pub bert_model:        String,
    pub checkpoint_dir:    String,

    // preprocessing
    pub seq_len:           usize,
    pub num_image_embeds:  usize,
    pub image_size:        usize,
    pub s2s_prob:          f64,
    pub bi_prob:           f64,
    pub attn_1d:           bool,
    pub new_segment_ids:   bool,

    // architecture
    pub hidden_size:       usize,
    pub num_heads:         usize,
    pub num_layers:        usize,
    pub intermediate_size: usize,
    pub dropout:           f64,
    pub img_hidden_sz:     usize,
    pub patch_size:        usize,
    pub img_position:      bool,
    pub mlm_task:          bool,
    pub itm_task:          bool,

    // optimisation
    pub batch_size:        usize,
    pub epochs:            usize,
    pub lr:                f64,
    pub weight_decay:      f32,
    /// 0 disables clipping
    pub max_grad_norm:     f32,
    pub val_fraction:      f64,
    pub num_workers:       usize,
    pub log_every:         usize,
    pub seed:              u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:         "data/train.jsonl".to_string(),
            image_root:        None,
            vocab_path:        "data/vocab".to_string(),
            bert_model:        "bert-base-uncased".to_string(),
            checkpoint_dir:    "checkpoints".to_string(),
            seq_len:           253,
            num_image_embeds:  100,
            image_size:        512,
            s2s_prob:          0.0,
            bi_prob:           1.0,
            attn_1d:           false,
            new_segment_ids:   false,
            hidden_size:       512,
            num_heads:         8,
            num_layers:        4,
            intermediate_size: 2048,
            dropout:           0.1,
            img_hidden_sz:     2048,
            patch_size:        32,
            img_position:      true,
            mlm_task:          true,
            itm_task:          true,
            batch_size:        8,
            epochs:            10,
            lr:                1e-4,
            weight_decay:      0.0,
            max_grad_norm:     1.0,
            val_fraction:      0.1,
            num_workers:       1,
            log_every:         100,
            seed:              42,
        }
    }
}

impl TrainConfig {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            seq_len:          self.seq_len,
            num_image_embeds: self.num_image_embeds,
            s2s_prob:         self.s2s_prob,
            bi_prob:          self.bi_prob,
            attn_1d:          self.attn_1d,
            new_segment_ids:  self.new_segment_ids,
            seed:             self.seed,
        }
    }

    pub fn model_config(&self, vocab_size: usize) -> CxrBertConfig {
        CxrBertConfig::new(vocab_size, self.seq_len, self.num_image_embeds)
            .with_hidden_size(self.hidden_size)
            .with_num_heads(self.num_heads)
            .with_num_layers(self.num_layers)
            .with_intermediate_size(self.intermediate_size)
            .with_dropout(self.dropout)
            .with_img_hidden_sz(self.img_hidden_sz)
            .with_image_size(self.image_size)
            .with_patch_size(self.patch_size)
            .with_img_position(self.img_position)
            .with_new_segment_ids(self.new_segment_ids)
            .with_mlm_task(self.mlm_task)
            .with_itm_task(self.itm_task)
    }

    pub fn variant(&self) -> Result<VocabVariant> {
        Ok(VocabVariant::from_name(&self.bert_model)?)
    }

    pub fn image_loader(&self) -> XrayImageLoader {
        let loader = XrayImageLoader::new(self.image_size as u32);
        match &self.image_root {
            Some(root) => loader.with_root(root),
            None => loader,
        }
    }

    pub fn load_vocabulary(&self) -> Result<Vocabulary> {
        VocabStore::new(&self.vocab_path)
            .load(self.variant()?)
            .with_context(|| format!("Cannot load vocabulary for '{}'", self.bert_model))
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        let pipeline = cfg.pipeline_config();
        pipeline.validate()?;

        // ── Step 1: Load records ─────────────────────────────────────────────
        tracing::info!("Loading records from '{}'", cfg.data_path);
        let records = JsonlLoader::new(&cfg.data_path)
            .load_all()
            .with_context(|| format!("Cannot load dataset '{}'", cfg.data_path))?;

        // ── Step 2: Vocabulary ───────────────────────────────────────────────
        let vocab = Arc::new(cfg.load_vocabulary()?);
        let model_cfg = cfg.model_config(vocab.len());
        model_cfg.validate()?;

        // ── Step 3: Train / validation split ─────────────────────────────────
        // Split by record so no study appears on both sides.
        let (train_records, val_records) = split_train_val(records, 1.0 - cfg.val_fraction, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            train_records.len(),
            val_records.len()
        );
        if val_records.is_empty() {
            anyhow::bail!("Validation split is empty; raise --val-fraction or add records");
        }

        // ── Step 4: Datasets ─────────────────────────────────────────────────
        let images: Arc<dyn ImageSource> = Arc::new(cfg.image_loader());
        let image_shape = images.shape();
        let train_dataset = CxrDataset::new(train_records.into(), vocab.clone(), images.clone(), &pipeline)?;
        // validation draws from its own stream
        let val_pipeline = PipelineConfig { seed: cfg.seed.wrapping_add(1), ..pipeline };
        let val_dataset = CxrDataset::new(val_records.into(), vocab, images, &val_pipeline)?;

        // ── Step 5: Persist what a later run needs ───────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(cfg)?;
        ckpt_manager.save_model_config(&model_cfg)?;
        VocabStore::new(&cfg.vocab_path).persist(ckpt_manager.dir())?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 6: Training loop (Layer 5) ──────────────────────────────────
        run_training(
            TrainingRun {
                config:      cfg,
                model:       model_cfg,
                image_shape,
                checkpoints: ckpt_manager,
                metrics,
            },
            train_dataset,
            val_dataset,
        )
    }
}
