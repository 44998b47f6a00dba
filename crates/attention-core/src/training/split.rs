//! Train/validation/test partitioning by user.

use std::collections::{BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::WindowedSample;

/// Split fractions and shuffle seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    /// Fraction of users in validation.
    pub val_ratio: f64,
    /// Fraction of users in test.
    pub test_ratio: f64,
    /// Shuffle seed.
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            val_ratio: 0.2,
            test_ratio: 0.1,
            seed: 42,
        }
    }
}

/// Samples partitioned so that no user appears in two partitions.
#[derive(Debug, Clone, Default)]
pub struct Splits {
    /// Training samples.
    pub train: Vec<WindowedSample>,
    /// Validation samples.
    pub val: Vec<WindowedSample>,
    /// Test samples.
    pub test: Vec<WindowedSample>,
}

/// Shuffles the distinct users and assigns the first `⌊n·test⌋` to test,
/// the next `⌊n·val⌋` to validation and the rest to training.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn split_by_user(samples: Vec<WindowedSample>, config: SplitConfig) -> Splits {
    let mut users: Vec<i64> = samples
        .iter()
        .map(|s| s.user_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    users.shuffle(&mut StdRng::seed_from_u64(config.seed));

    let n = users.len() as f64;
    let test_n = (n * config.test_ratio.clamp(0.0, 1.0)).floor() as usize;
    let val_n = ((n * config.val_ratio.clamp(0.0, 1.0)).floor() as usize).min(users.len() - test_n);

    let test_users: HashSet<i64> = users[..test_n].iter().copied().collect();
    let val_users: HashSet<i64> = users[test_n..test_n + val_n].iter().copied().collect();

    let mut splits = Splits::default();
    for sample in samples {
        if test_users.contains(&sample.user_id) {
            splits.test.push(sample);
        } else if val_users.contains(&sample.user_id) {
            splits.val.push(sample);
        } else {
            splits.train.push(sample);
        }
    }
    splits
}
