// ============================================================
// Layer 4 — Masking Policy (MLM labels)
// ============================================================
// BERT's masked-language-model corruption, applied per sample:
//
//   For every position draw p ~ U(0, 1)
//     p <  0.15 → selected; rescale q = p / 0.15
//        q <  0.8 → replace with [MASK]
//        q <  0.9 → replace with a random vocabulary id
//        else     → keep the token as is
//        label    = the ORIGINAL id in all three cases
//     p >= 0.15 → untouched, label = IGNORE_INDEX
//
// If nothing was selected the loss would be empty, so position
// 0 is forced to [MASK] in that case.
//
// Randomness comes from the caller. With a seeded stream the
// output is exactly reproducible.
//
// Reference: Devlin et al. (2019) BERT paper §3.1, Appendix A.1

use rand::Rng;

/// Label value that contributes nothing to the loss.
pub const IGNORE_INDEX: i64 = -100;

const SELECT_PROB: f64 = 0.15;
const MASK_SHARE: f64 = 0.8;
const RANDOM_SHARE: f64 = 0.9;

/// Corrupted ids plus the labels needed to recover them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedSequence {
    pub token_ids:       Vec<u32>,
    pub recovery_labels: Vec<i64>,
}

impl MaskedSequence {
    /// Positions that contribute to the MLM loss
    #[cfg(test)]
    pub fn masked_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.recovery_labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l != IGNORE_INDEX)
            .map(|(i, _)| i)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaskingPolicy {
    mask_id:    u32,
    vocab_size: usize,
}

impl MaskingPolicy {
    pub fn new(mask_id: u32, vocab_size: usize) -> Self {
        Self { mask_id, vocab_size }
    }

    pub fn mask<R: Rng + ?Sized>(&self, token_ids: &[u32], rng: &mut R) -> MaskedSequence {
        let mut ids    = token_ids.to_vec();
        let mut labels = Vec::with_capacity(ids.len());

        for (slot, &original) in ids.iter_mut().zip(token_ids) {
            let p: f64 = rng.gen();
            if p < SELECT_PROB {
                let q = p / SELECT_PROB;
                if q < MASK_SHARE {
                    *slot = self.mask_id;
                } else if q < RANDOM_SHARE {
                    *slot = rng.gen_range(0..self.vocab_size) as u32;
                }
                labels.push(original as i64);
            } else {
                labels.push(IGNORE_INDEX);
            }
        }

        if !ids.is_empty() && labels.iter().all(|&l| l == IGNORE_INDEX) {
            labels[0] = token_ids[0] as i64;
            ids[0]    = self.mask_id;
        }

        MaskedSequence { token_ids: ids, recovery_labels: labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::mock::StepRng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const MASK: u32 = 4;

    fn policy() -> MaskingPolicy {
        MaskingPolicy::new(MASK, 1000)
    }

    #[test]
    fn test_length_preserved() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for len in [1usize, 2, 5, 40, 253] {
            let ids: Vec<u32> = (10..10 + len as u32).collect();
            let out = policy().mask(&ids, &mut rng);
            assert_eq!(out.token_ids.len(), len);
            assert_eq!(out.recovery_labels.len(), len);
        }
    }

    #[test]
    fn test_at_least_one_label_for_any_seed() {
        let ids = [11u32, 12, 13];
        for seed in 0..500 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let out = policy().mask(&ids, &mut rng);
            assert!(out.recovery_labels.iter().any(|&l| l != IGNORE_INDEX), "seed {seed}");
        }
    }

    #[test]
    fn test_labels_hold_original_ids() {
        let ids: Vec<u32> = (100..200).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let out = policy().mask(&ids, &mut rng);
        for (i, &label) in out.recovery_labels.iter().enumerate() {
            if label == IGNORE_INDEX {
                assert_eq!(out.token_ids[i], ids[i], "unselected token changed");
            } else {
                assert_eq!(label, ids[i] as i64);
            }
        }
    }

    #[test]
    fn test_reproducible_with_same_seed() {
        let ids: Vec<u32> = (20..80).collect();
        let a = policy().mask(&ids, &mut ChaCha8Rng::seed_from_u64(99));
        let b = policy().mask(&ids, &mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_selection_rate_near_fifteen_percent() {
        let ids: Vec<u32> = vec![42; 20_000];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = policy().mask(&ids, &mut rng);
        let rate = out.masked_positions().count() as f64 / ids.len() as f64;
        assert!((rate - 0.15).abs() < 0.01, "selection rate {rate}");

        // Most selected positions become [MASK]
        let masked = out.token_ids.iter().filter(|&&t| t == MASK).count() as f64;
        let share  = masked / out.masked_positions().count() as f64;
        assert!((share - 0.8).abs() < 0.03, "mask share {share}");
    }

    #[test]
    fn test_selected_positions_split_eighty_ten_ten() {
        // every original id is 42, so a surviving 42 was kept and
        // anything else besides [MASK] was randomised
        let ids: Vec<u32> = vec![42; 40_000];
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let out = policy().mask(&ids, &mut rng);

        let mut masked = 0usize;
        let mut random = 0usize;
        let mut kept   = 0usize;
        for i in out.masked_positions() {
            match out.token_ids[i] {
                MASK => masked += 1,
                42   => kept += 1,
                _    => random += 1,
            }
        }
        let selected = (masked + random + kept) as f64;
        let share = |n: usize| n as f64 / selected;
        assert!((share(masked) - 0.8).abs() < 0.03, "mask share {}", share(masked));
        assert!((share(random) - 0.1).abs() < 0.02, "random share {}", share(random));
        assert!((share(kept) - 0.1).abs() < 0.02, "kept share {}", share(kept));
    }

    #[test]
    fn test_nothing_selected_forces_first_position() {
        // constant draws just below 1.0: no position is ever selected
        let mut rng = StepRng::new(u64::MAX, 0);
        let ids = [17u32, 18, 19];
        let out = policy().mask(&ids, &mut rng);

        assert_eq!(out.token_ids, vec![MASK, 18, 19]);
        assert_eq!(out.recovery_labels, vec![17, IGNORE_INDEX, IGNORE_INDEX]);
    }

    #[test]
    fn test_empty_input() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = policy().mask(&[], &mut rng);
        assert!(out.token_ids.is_empty());
        assert!(out.recovery_labels.is_empty());
    }
}
