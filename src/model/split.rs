use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffles `0..n` with a seeded RNG and cuts off `ceil(n · test_fraction)`
/// rows for testing. With two or more rows each side keeps at least one.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> TrainTestSplit {
    let fraction = if test_fraction.is_finite() {
        test_fraction.clamp(0.0, 1.0)
    } else {
        DEFAULT_TEST_FRACTION
    };
    let mut n_test = (n as f64 * fraction).ceil() as usize;
    if n >= 2 {
        n_test = n_test.clamp(1, n - 1);
    } else {
        n_test = 0;
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    TrainTestSplit { train, test: indices }
}

/// Contiguous, unshuffled folds. The first `n % k` folds get one extra row.
pub fn kfold(n: usize, k: usize) -> Vec<TrainTestSplit> {
    if k == 0 {
        return Vec::new();
    }
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|fold| {
            let size = base + usize::from(fold < extra);
            let end = start + size;
            let split = TrainTestSplit {
                train: (0..start).chain(end..n).collect(),
                test: (start..end).collect(),
            };
            start = end;
            split
        })
        .collect()
}
