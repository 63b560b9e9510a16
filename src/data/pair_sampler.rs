// ============================================================
// Layer 4 — Pair Sampler (ITM negatives)
// ============================================================
// Image-text matching needs both true and corrupted pairs.
// For each access:
//
//   coin flip > 0.5 → the record's own report   (aligned)
//   otherwise       → up to MAX_ATTEMPTS draws of a random
//                     record; the first one whose label is NOT
//                     a fuzzy match of ours donates its report
//                     (misaligned)
//
// A label is a "match" when token_sort_ratio == 100, i.e. the
// two labels contain the same words in any order. Rejecting
// those keeps a "pneumonia" report from being used as a
// negative for a "pneumonia" image.
//
// When every attempt hits a matching label (tiny or single-label
// datasets) we fall back to the aligned pair and count it.
//
// Reference: Chen et al. (2020) UNITER, ITM negative sampling
//            strsim crate documentation

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::domain::record::{PairedExample, Record};

const MAX_ATTEMPTS: usize = 10;
const IDENTICAL: u8 = 100;

#[derive(Debug, Default)]
pub struct PairSampler {
    exhausted: AtomicU64,
}

impl PairSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the pair for `records[index]`.
    pub fn sample<'a, R: Rng + ?Sized>(
        &self,
        records: &'a [Record],
        index:   usize,
        rng:     &mut R,
    ) -> PairedExample<'a> {
        let record = &records[index];

        if rng.gen::<f64>() > 0.5 {
            return PairedExample::aligned(record);
        }

        for _ in 0..MAX_ATTEMPTS {
            let other = &records[rng.gen_range(0..records.len())];
            if token_sort_ratio(&record.label, &other.label) != IDENTICAL {
                return PairedExample::misaligned(record, other);
            }
        }

        let total = self.exhausted.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "No dissimilar label found for '{}' after {} attempts (fallbacks so far: {})",
            record.label,
            MAX_ATTEMPTS,
            total
        );
        PairedExample::aligned(record)
    }

    /// How many draws fell back to the aligned pair
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }
}

// ─── Label Similarity ─────────────────────────────────────────────────────────
/// Fuzzy similarity of two labels on a 0..=100 scale, insensitive
/// to word order, case and punctuation.
///
/// Either side empty after cleaning scores 0.
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    let a = sorted_tokens(a);
    let b = sorted_tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    (strsim::normalized_levenshtein(&a, &b) * 100.0).round() as u8
}

fn sorted_tokens(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    words.sort_unstable();
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::ReportText;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn record(img: &str, text: &str, label: &str) -> Record {
        Record::new(img, ReportText::Raw(text.into()), label)
    }

    #[test]
    fn test_token_sort_ratio_ignores_order_and_case() {
        assert_eq!(token_sort_ratio("Pleural Effusion, Edema", "edema pleural effusion"), 100);
        assert_eq!(token_sort_ratio("pneumonia", "pneumonia"), 100);
        assert!(token_sort_ratio("pneumonia", "normal") < 100);
        assert_eq!(token_sort_ratio("", "normal"), 0);
    }

    #[test]
    fn test_token_sort_ratio_folds_non_ascii_case() {
        assert_eq!(token_sort_ratio("Émphysema", "émphysema"), 100);
        assert_eq!(token_sort_ratio("ÖDEM Pleura", "pleura ödem"), 100);
    }

    #[test]
    fn test_aligned_rate_converges_to_half() {
        let records: Vec<Record> = (0..50)
            .map(|i| record(&format!("{i}.jpg"), "report", &format!("label {i}")))
            .collect();
        let sampler = PairSampler::new();
        let mut rng = ChaCha8Rng::seed_from_u64(2024);

        let draws   = 20_000;
        let aligned = (0..draws)
            .filter(|i| sampler.sample(&records, i % records.len(), &mut rng).is_aligned)
            .count();
        let rate = aligned as f64 / draws as f64;
        // Draws landing on the same record are rejected and retried,
        // so exhaustion is practically impossible with 50 labels.
        assert!((rate - 0.5).abs() < 0.02, "aligned rate {rate}");
        assert_eq!(sampler.exhausted_count(), 0);
    }

    #[test]
    fn test_same_label_never_used_as_negative() {
        let records = vec![
            record("a.jpg", "right lower lobe opacity", "pneumonia"),
            record("b.jpg", "consolidation", "pneumonia"),
            record("c.jpg", "no acute findings", "normal"),
        ];
        let sampler = PairSampler::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..2_000 {
            let pair = sampler.sample(&records, 0, &mut rng);
            assert_eq!(pair.image, "a.jpg");
            if !pair.is_aligned {
                assert_eq!(pair.label, "normal");
                assert_eq!(pair.text, &records[2].text);
            }
        }
    }

    #[test]
    fn test_single_label_dataset_falls_back_to_aligned() {
        let records = vec![
            record("a.jpg", "x", "normal"),
            record("b.jpg", "y", "Normal"),
        ];
        let sampler = PairSampler::new();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..200 {
            assert!(sampler.sample(&records, 1, &mut rng).is_aligned);
        }
        assert!(sampler.exhausted_count() > 0);
    }
}
