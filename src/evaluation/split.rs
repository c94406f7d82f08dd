//! Seeded stratified train/test partitioning.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::Label;

/// Row indices of a train/test partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    /// Training rows, ascending
    pub train: Vec<usize>,
    /// Held-out rows, ascending
    pub test: Vec<usize>,
}

/// Split rows so every class appears in both partitions in proportion.
///
/// Each class with `n_c >= 2` rows contributes `round(n_c * test_fraction)`
/// rows to the test set, clamped to `[1, n_c - 1]`. Classes with a single
/// row stay in the training set. The same `seed` always yields the same
/// partition for the same labels.
pub fn stratified_split(labels: &[Label], test_fraction: f64, seed: u64) -> Split {
    let mut by_class: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(row);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for rows in by_class.values_mut() {
        rows.shuffle(&mut rng);
        let n = rows.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Split { train, test }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_all_rows_once() {
        let labels: Vec<Label> = (0..50).map(|i| i % 3).collect();
        let split = stratified_split(&labels, 0.2, 42);
        let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_classes_proportionally_represented() {
        let labels: Vec<Label> = (0..150).map(|i| i / 50).collect();
        let split = stratified_split(&labels, 0.2, 7);
        assert_eq!(split.test.len(), 30);
        for class in 0..3 {
            let in_test = split.test.iter().filter(|&&r| labels[r] == class).count();
            assert_eq!(in_test, 10, "class {} should contribute 10 test rows", class);
        }
    }

    #[test]
    fn test_same_seed_same_split() {
        let labels: Vec<Label> = (0..40).map(|i| i % 2).collect();
        assert_eq!(
            stratified_split(&labels, 0.25, 1),
            stratified_split(&labels, 0.25, 1)
        );
        assert_ne!(
            stratified_split(&labels, 0.25, 1),
            stratified_split(&labels, 0.25, 2)
        );
    }

    #[test]
    fn test_tiny_classes() {
        // Class 5 has one row and stays in train; class 6 keeps one train row.
        let labels = vec![5, 6, 6];
        let split = stratified_split(&labels, 0.9, 0);
        assert!(split.train.contains(&0));
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.train.len(), 2);
    }
}
