// ============================================================
// Layer 4 — JSONL Record Loader
// ============================================================
// Reads the training manifest: one JSON object per line.
//
//   {"img": "files/p10/s50414267/02aa804e.jpg",
//    "text": ["no", "acute", "cardiopulmonary", "process"],
//    "label": ["Normal"]}
//
// Field rules:
//   img   — path string, required
//   text  — list of word pieces or a raw sentence, required
//   label — string or list of strings, required;
//           an empty list becomes "Others",
//           a non-empty list is joined with spaces
//
// The whole file is read eagerly at startup. A line that does
// not parse fails the load with its file and line number; there
// is no partial recovery. Blank lines are skipped.
//
// Reference: serde_json documentation (untagged enums)
//            Rust Book §9 (Error Handling)

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::record::{Record, ReportText, FALLBACK_LABEL};
use crate::domain::traits::RecordSource;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLabel {
    One(String),
    Many(Vec<String>),
}

impl RawLabel {
    fn normalise(self) -> String {
        match self {
            RawLabel::One(label) => label,
            RawLabel::Many(labels) if labels.is_empty() => FALLBACK_LABEL.to_string(),
            RawLabel::Many(labels) => labels.join(" "),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    img:   String,
    text:  ReportText,
    label: RawLabel,
}

/// Loads records from a newline-delimited JSON file.
pub struct JsonlLoader {
    path: PathBuf,
}

impl JsonlLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn malformed(&self, line: usize, reason: impl ToString) -> PipelineError {
        PipelineError::MalformedRecord {
            path:   self.path.display().to_string(),
            line,
            reason: reason.to_string(),
        }
    }
}

impl RecordSource for JsonlLoader {
    fn load_all(&self) -> PipelineResult<Vec<Record>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawRecord = serde_json::from_str(&line)
                .map_err(|e| self.malformed(idx + 1, e))?;

            records.push(Record::new(raw.img, raw.text, raw.label.normalise()));
        }

        tracing::info!(
            "Loaded {} records from '{}'",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }
}
