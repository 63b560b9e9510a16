// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per epoch:
//
//   epoch,train_loss,val_loss,mlm_acc,itm_acc
//   1,9.812300,9.640100,0.041000,0.507000
//   2,8.120400,8.031900,0.088000,0.549000
//
//   mlm_acc — fraction of masked positions recovered exactly
//   itm_acc — fraction of pairs classified aligned/misaligned correctly
//
// ITM accuracy hovering at 0.5 means the model has not yet
// learned to tell matched X-ray/report pairs from shuffled ones.
//
// Output file: <checkpoint_dir>/metrics.csv
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

const HEADER: &str = "epoch,train_loss,val_loss,mlm_acc,itm_acc";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:      usize,
    pub train_loss: f64,
    pub val_loss:   f64,
    /// Range [0.0, 1.0]; 0.0 when the MLM task is off
    pub mlm_acc:    f64,
    /// Range [0.0, 1.0]; 0.0 when the ITM task is off
    pub itm_acc:    f64,
}

impl EpochMetrics {
    pub fn new(
        epoch:      usize,
        train_loss: f64,
        val_loss:   f64,
        mlm_acc:    f64,
        itm_acc:    f64,
    ) -> Self {
        Self { epoch, train_loss, val_loss, mlm_acc, itm_acc }
    }

    /// NaN never counts as an improvement.
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }

    fn csv_row(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{:.6}",
            self.epoch, self.train_loss, self.val_loss, self.mlm_acc, self.itm_acc,
        )
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so
    /// resumed runs keep appending to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 2.5, 2.3, 0.2, 0.6);
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
        assert!(!EpochMetrics::new(1, 1.0, f64::NAN, 0.0, 0.0).is_improvement(f64::INFINITY));
    }

    #[test]
    fn test_rows_append_under_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&EpochMetrics::new(1, 3.0, 2.5, 0.1, 0.5)).unwrap();

        // a second logger on the same directory must not rewrite the header
        let again = MetricsLogger::new(dir.path()).unwrap();
        again.log(&EpochMetrics::new(2, 2.0, 1.5, 0.2, 0.75)).unwrap();

        let text = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "1,3.000000,2.500000,0.100000,0.500000");
        assert_eq!(lines[2], "2,2.000000,1.500000,0.200000,0.750000");
        assert_eq!(lines.len(), 3);
    }
}
