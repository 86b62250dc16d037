//! Stratified train/test splits and cross-validation folds

use crate::error::{ChurnError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle each class separately and hold out `test_size` of it
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> Result<Split> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ChurnError::Validation(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }
    if labels.len() < 2 {
        return Err(ChurnError::Validation(
            "need at least 2 rows to split".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for mut class in class_indices(labels) {
        class.shuffle(&mut rng);
        let mut n_test = (class.len() as f64 * test_size).round() as usize;
        // Keep at least one row of the class on each side when it has two or more
        if class.len() >= 2 {
            n_test = n_test.clamp(1, class.len() - 1);
        }
        test.extend_from_slice(&class[..n_test]);
        train.extend_from_slice(&class[n_test..]);
    }

    if train.is_empty() || test.is_empty() {
        return Err(ChurnError::Validation(
            "split produced an empty partition".to_string(),
        ));
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(Split { train, test })
}

/// Partition rows into `k` folds with class proportions kept per fold
pub fn stratified_folds(labels: &[u8], k: usize, seed: u64) -> Result<Vec<Split>> {
    if k < 2 {
        return Err(ChurnError::Validation(format!("need at least 2 folds, got {}", k)));
    }
    if labels.len() < k {
        return Err(ChurnError::Validation(format!(
            "{} rows cannot fill {} folds",
            labels.len(),
            k
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; labels.len()];
    let mut next = 0usize;
    for mut class in class_indices(labels) {
        class.shuffle(&mut rng);
        for idx in class {
            fold_of[idx] = next % k;
            next += 1;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            Split { train, test }
        })
        .collect())
}

fn class_indices(labels: &[u8]) -> Vec<Vec<usize>> {
    let mut negatives = Vec::new();
    let mut positives = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        if label == 1 {
            positives.push(i);
        } else {
            negatives.push(i);
        }
    }
    vec![negatives, positives]
        .into_iter()
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n_pos: usize, n_neg: usize) -> Vec<u8> {
        let mut v = vec![1u8; n_pos];
        v.extend(vec![0u8; n_neg]);
        v
    }

    #[test]
    fn test_split_keeps_class_ratio() {
        let y = labels(30, 70);
        let split = stratified_split(&y, 0.2, 42).unwrap();

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        let test_pos = split.test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(test_pos, 6);
    }

    #[test]
    fn test_split_is_deterministic() {
        let y = labels(40, 60);
        assert_eq!(
            stratified_split(&y, 0.25, 7).unwrap(),
            stratified_split(&y, 0.25, 7).unwrap()
        );
        assert_ne!(
            stratified_split(&y, 0.25, 7).unwrap(),
            stratified_split(&y, 0.25, 8).unwrap()
        );
    }

    #[test]
    fn test_split_rejects_bad_test_size() {
        let y = labels(5, 5);
        assert!(stratified_split(&y, 0.0, 1).is_err());
        assert!(stratified_split(&y, 1.0, 1).is_err());
    }

    #[test]
    fn test_folds_cover_every_row_once() {
        let y = labels(12, 28);
        let folds = stratified_folds(&y, 4, 3).unwrap();
        assert_eq!(folds.len(), 4);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 40);
            let pos = fold.test.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(pos, 3);
        }
    }

    #[test]
    fn test_folds_reject_too_few_rows() {
        assert!(stratified_folds(&labels(1, 1), 3, 0).is_err());
        assert!(stratified_folds(&labels(5, 5), 1, 0).is_err());
    }
}
