use rand::RngCore;
use rand::seq::SliceRandom;

/// K-Fold cross-validation splitter.
///
/// Row indices are shuffled with the caller's RNG, then cut into `n_splits`
/// consecutive folds. The first `n_samples % n_splits` folds get one extra
/// row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    /// Create a new K-Fold splitter. `n_splits` must be at least 2.
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate `(train_indices, test_indices)` for each fold.
    pub fn split(&self, n_samples: usize, rng: &mut dyn RngCore) -> Vec<(Vec<usize>, Vec<usize>)> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(rng);

        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut result = Vec::with_capacity(self.n_splits);
        let mut start = 0;

        for i in 0..self.n_splits {
            let current_fold_size = if i < remainder {
                fold_size + 1
            } else {
                fold_size
            };
            let end = start + current_fold_size;

            let test_indices = indices[start..end].to_vec();
            let mut train_indices = Vec::with_capacity(n_samples - current_fold_size);
            train_indices.extend_from_slice(&indices[..start]);
            train_indices.extend_from_slice(&indices[end..]);

            result.push((train_indices, test_indices));
            start = end;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_folds_partition_all_rows() {
        let mut rng = StdRng::seed_from_u64(3);
        let splits = KFold::new(3).split(10, &mut rng);
        assert_eq!(splits.len(), 3);

        let mut seen: Vec<usize> = splits.iter().flat_map(|(_, test)| test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        let sizes: Vec<usize> = splits.iter().map(|(_, test)| test.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);

        for (train, test) in &splits {
            assert_eq!(train.len() + test.len(), 10);
            assert!(test.iter().all(|i| !train.contains(i)));
        }
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = KFold::new(4).split(17, &mut StdRng::seed_from_u64(9));
        let b = KFold::new(4).split(17, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
