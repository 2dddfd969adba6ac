use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Seeded random source used for weight initialisation and sampling.
///
/// Training never touches the thread-local generator so that a model with a
/// fixed `random_state` reproduces the same initial weights.
#[derive(Debug, Clone)]
pub struct RandomGenerator {
    rng: StdRng,
}

impl RandomGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform integer in `[0, n)`.
    pub fn intn(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Matrix of `rows × cols` values drawn from N(mean, std_dev²).
    pub fn normal_matrix(&mut self, rows: usize, cols: usize, mean: f32, std_dev: f32) -> Array2<f32> {
        let normal = normal_or_point(mean, std_dev);
        Array2::from_shape_simple_fn((rows, cols), || match &normal {
            Some(dist) => dist.sample(&mut self.rng),
            None => mean,
        })
    }

    /// Distinct sample of up to `n` values from `[0, upper)` skipping `exclude`.
    ///
    /// Falls back to a full scan once rejection sampling stops making progress,
    /// so a nearly exhausted pool still terminates.
    pub fn sample_excluding<F>(&mut self, upper: usize, n: usize, exclude: F) -> Vec<usize>
    where
        F: Fn(usize) -> bool,
    {
        let mut picked = std::collections::HashSet::with_capacity(n);
        let mut sample = Vec::with_capacity(n);
        let mut attempts = 0;
        while sample.len() < n && attempts < n.saturating_mul(8) + 16 {
            attempts += 1;
            let candidate = self.intn(upper);
            if !exclude(candidate) && picked.insert(candidate) {
                sample.push(candidate);
            }
        }
        if sample.len() < n {
            for candidate in 0..upper {
                if sample.len() >= n {
                    break;
                }
                if !exclude(candidate) && picked.insert(candidate) {
                    sample.push(candidate);
                }
            }
        }
        sample
    }
}

fn normal_or_point(mean: f32, std_dev: f32) -> Option<Normal<f32>> {
    if std_dev > 0.0 {
        Normal::new(mean, std_dev).ok()
    } else {
        None
    }
}
