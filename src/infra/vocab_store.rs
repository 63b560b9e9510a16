// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Finds and loads the word-piece vocabulary of the pretrained
// text backbone. Two on-disk formats are accepted:
//
//   tokenizer.json — HuggingFace tokenizer; also used to split
//                    raw-text reports into word pieces
//   vocab.txt      — one token per line, line number = id
//
// A directory path is searched for tokenizer.json first, then
// vocab.txt. The file that was used is copied next to the
// checkpoints so a run can be reproduced later.
//
// Reference: HuggingFace tokenizers documentation

use anyhow::{bail, Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::data::vocab::{VocabVariant, Vocabulary};

const TOKENIZER_FILE: &str = "tokenizer.json";
const VOCAB_FILE:     &str = "vocab.txt";

pub struct VocabStore {
    path: PathBuf,
}

impl VocabStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the concrete vocabulary file behind the configured path.
    pub fn resolve(&self) -> Result<PathBuf> {
        if self.path.is_file() {
            return Ok(self.path.clone());
        }
        if self.path.is_dir() {
            for name in [TOKENIZER_FILE, VOCAB_FILE] {
                let candidate = self.path.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
            bail!(
                "No {TOKENIZER_FILE} or {VOCAB_FILE} found in '{}'",
                self.path.display()
            );
        }
        bail!("Vocabulary path '{}' does not exist", self.path.display())
    }

    pub fn load(&self, variant: VocabVariant) -> Result<Vocabulary> {
        let file = self.resolve()?;
        let is_json = file.extension().is_some_and(|ext| ext == "json");

        let vocab = if is_json {
            let tokenizer = Tokenizer::from_file(&file).map_err(|e| {
                anyhow::anyhow!("Cannot load tokenizer from '{}': {e}", file.display())
            })?;
            let stoi = tokenizer.get_vocab(true);
            Vocabulary::new(stoi, variant, Some(tokenizer))?
        } else {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("Cannot read vocabulary '{}'", file.display()))?;
            Vocabulary::new(parse_vocab_txt(&text), variant, None)?
        };

        tracing::info!(
            "Loaded {} vocabulary ({} ids) from '{}'",
            variant.name(),
            vocab.len(),
            file.display()
        );
        Ok(vocab)
    }

    /// Copy the resolved vocabulary file into `dir`.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf> {
        let file = self.resolve()?;
        let name = file.file_name().map(PathBuf::from).unwrap_or_else(|| VOCAB_FILE.into());
        let target = dir.join(name);
        if target != file {
            fs::copy(&file, &target)
                .with_context(|| format!("Cannot copy vocabulary to '{}'", target.display()))?;
        }
        Ok(target)
    }
}

/// BERT vocab.txt: the id of a token is its zero-based line number.
/// Repeated tokens keep their first id.
fn parse_vocab_txt(text: &str) -> HashMap<String, u32> {
    let mut stoi = HashMap::new();
    for (id, line) in text.lines().enumerate() {
        let token = line.trim_end_matches('\r');
        if !token.is_empty() {
            stoi.entry(token.to_string()).or_insert(id as u32);
        }
    }
    stoi
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: &str = "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\nlung\nclear\n";

    #[test]
    fn test_line_number_is_id() {
        let stoi = parse_vocab_txt(VOCAB);
        assert_eq!(stoi["[PAD]"], 0);
        assert_eq!(stoi["clear"], 6);
    }

    #[test]
    fn test_directory_lookup_and_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(VOCAB_FILE), VOCAB).unwrap();

        let store = VocabStore::new(dir.path());
        assert_eq!(store.resolve().unwrap(), dir.path().join(VOCAB_FILE));

        let vocab = store.load(VocabVariant::BertBaseUncased).unwrap();
        assert_eq!(vocab.len(), 7);
        assert_eq!(vocab.special().mask, 4);
    }

    #[test]
    fn test_missing_specials_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(VOCAB_FILE);
        fs::write(&file, VOCAB).unwrap();
        // ALBERT expects <unk>/<pad>
        assert!(VocabStore::new(&file).load(VocabVariant::AlbertBaseV2).is_err());
    }

    #[test]
    fn test_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VocabStore::new(dir.path().join("nope")).resolve().is_err());
    }

    #[test]
    fn test_persist_copies_file() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join(VOCAB_FILE), VOCAB).unwrap();

        let copied = VocabStore::new(src.path()).persist(dst.path()).unwrap();
        assert_eq!(fs::read_to_string(copied).unwrap(), VOCAB);
    }
}
