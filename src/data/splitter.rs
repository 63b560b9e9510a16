// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles the records with a seeded stream and cuts them into
// a training and a validation set.
//
// The split happens at the RECORD level, before any pairing or
// masking, so a validation X-ray never shows up in training,
// not even as the image half of a negative pair.
//
// Same seed, same split.
//
// Reference: rand crate documentation (SliceRandom)

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Shuffle `items` and split them into (train, validation).
///
/// `train_fraction` is clamped to [0, 1]; the split index is
/// rounded to the nearest item.
pub fn split_train_val<T>(mut items: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let total    = items.len();
    let fraction = train_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * fraction).round() as usize;

    let val = items.split_off(split_at.min(total));

    tracing::debug!(
        "Split {} records into {} training / {} validation",
        total,
        items.len(),
        val.len()
    );

    (items, val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let (train, val) = split_train_val((0..100).collect::<Vec<usize>>(), 0.9, 1);
        assert_eq!(train.len(), 90);
        assert_eq!(val.len(), 10);
    }

    #[test]
    fn test_no_item_lost_or_duplicated() {
        let (train, val) = split_train_val((0..57).collect::<Vec<usize>>(), 0.7, 3);
        let mut all: Vec<usize> = train.into_iter().chain(val).collect();
        all.sort_unstable();
        assert_eq!(all, (0..57).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_fixes_the_split() {
        let items: Vec<usize> = (0..30).collect();
        assert_eq!(
            split_train_val(items.clone(), 0.8, 7),
            split_train_val(items, 0.8, 7)
        );
    }

    #[test]
    fn test_degenerate_fractions() {
        let (train, val) = split_train_val(Vec::<usize>::new(), 0.8, 0);
        assert!(train.is_empty() && val.is_empty());

        let (train, val) = split_train_val((0..10).collect::<Vec<usize>>(), 1.5, 0);
        assert_eq!(train.len(), 10);
        assert!(val.is_empty());
    }
}
