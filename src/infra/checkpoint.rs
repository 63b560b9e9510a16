// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves CXR-BERT weights using Burn's CompactRecorder.
//
// Files in the checkpoint directory:
//
//   checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1 (half precision)
//     model_epoch_2.mpk.gz
//     latest_epoch.json      ← number of the last saved epoch
//     best_epoch.json        ← epoch with the lowest val_loss so far
//     train_config.json      ← full TrainConfig of the run
//     model_config.json      ← CxrBertConfig (architecture)
//
// Weights can only be restored into a model built from the same
// architecture, hence model_config.json.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::{CxrBert, CxrBertConfig};

const LATEST_POINTER: &str = "latest_epoch.json";
const BEST_POINTER:   &str = "best_epoch.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write {dir}/model_epoch_{epoch}.mpk.gz and move the latest
    /// pointer to it.
    pub fn save_model<B: Backend>(&self, model: &CxrBert<B>, epoch: usize) -> Result<()> {
        // recorder appends the extension
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        self.write_pointer(LATEST_POINTER, epoch)?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Record `epoch` as the best checkpoint so far.
    pub fn mark_best(&self, epoch: usize) -> Result<()> {
        self.write_pointer(BEST_POINTER, epoch)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn save_model_config(&self, cfg: &CxrBertConfig) -> Result<()> {
        let path = self.dir.join("model_config.json");
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))?;
        Ok(())
    }

    fn write_pointer(&self, file: &str, epoch: usize) -> Result<()> {
        let path = self.dir.join(file);
        fs::write(&path, serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write '{}'", path.display()))
    }
}
