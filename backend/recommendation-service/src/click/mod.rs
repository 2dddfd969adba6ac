//! Factorization machines for click-through and rating prediction.

pub mod dataset;
pub mod evaluator;
pub mod fm;
pub mod unified_index;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use dataset::{ClickDataSet, ClickDataSetBuilder};
pub use evaluator::Score;
pub use fm::Fm;
pub use unified_index::{UnifiedIndex, UnifiedIndexBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Squared loss on real-valued targets.
    Regression,
    /// Logistic loss on targets in {-1, +1}.
    Classification,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Regression => f.write_str("regression"),
            Task::Classification => f.write_str("classification"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitConfig {
    pub jobs: usize,
    pub verbose: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            verbose: 10,
        }
    }
}

impl FitConfig {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_verbose(mut self, verbose: usize) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_checkpoint(&self, epoch: usize, n_epochs: usize) -> bool {
        epoch == n_epochs || epoch % self.verbose.max(1) == 0
    }
}
