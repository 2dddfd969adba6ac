use super::dataset::DataSet;
use crate::base::{Index, RandomGenerator, SharedMatrix};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Latent factors of a matrix factorization model together with the indices
/// that address their rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factors {
    pub user_index: Index,
    pub item_index: Index,
    pub user_factor: Array2<f32>,
    pub item_factor: Array2<f32>,
}

/// Hyper-parameters for random factor initialisation.
#[derive(Debug, Clone, Copy)]
pub struct InitParams {
    pub n_factors: usize,
    pub init_mean: f32,
    pub init_std_dev: f32,
}

impl Factors {
    /// Fresh random factors shaped for `train_set`. Rows of ids known to
    /// `previous` are copied over by id so retraining keeps learned vectors.
    pub fn init(
        previous: Option<&Factors>,
        train_set: &DataSet,
        rng: &mut RandomGenerator,
        init: InitParams,
    ) -> Self {
        let mut user_factor = rng.normal_matrix(
            train_set.user_count(),
            init.n_factors,
            init.init_mean,
            init.init_std_dev,
        );
        let mut item_factor = rng.normal_matrix(
            train_set.item_count(),
            init.n_factors,
            init.init_mean,
            init.init_std_dev,
        );
        if let Some(previous) = previous {
            relocate(
                &previous.user_index,
                &previous.user_factor,
                train_set.user_index(),
                &mut user_factor,
            );
            relocate(
                &previous.item_index,
                &previous.item_factor,
                train_set.item_index(),
                &mut item_factor,
            );
        }
        Self {
            user_index: train_set.user_index().clone(),
            item_index: train_set.item_index().clone(),
            user_factor,
            item_factor,
        }
    }

    pub fn n_factors(&self) -> usize {
        self.user_factor.ncols()
    }

    pub fn internal_predict(&self, user: usize, item: usize) -> f32 {
        self.user_factor.row(user).dot(&self.item_factor.row(item))
    }

    /// Unknown ids score 0.
    pub fn predict(&self, user_id: &str, item_id: &str) -> f32 {
        match (
            self.user_index.to_number(user_id),
            self.item_index.to_number(item_id),
        ) {
            (Some(user), Some(item)) => self.internal_predict(user, item),
            (None, _) => {
                warn!(user_id, "unknown user");
                0.0
            }
            (_, None) => {
                warn!(item_id, "unknown item");
                0.0
            }
        }
    }

    pub fn to_shared(&self) -> (SharedMatrix, SharedMatrix) {
        (
            SharedMatrix::from_array(&self.user_factor),
            SharedMatrix::from_array(&self.item_factor),
        )
    }

    pub fn with_weights(self, (user_factor, item_factor): (Array2<f32>, Array2<f32>)) -> Self {
        Self {
            user_factor,
            item_factor,
            ..self
        }
    }
}

/// Copies rows whose id exists in both indices, unless the factor width changed.
fn relocate(old_index: &Index, old: &Array2<f32>, new_index: &Index, new: &mut Array2<f32>) {
    if old.ncols() != new.ncols() {
        return;
    }
    for (new_row, name) in new_index.get_names().iter().enumerate() {
        if let Some(old_row) = old_index.to_number(name) {
            if old_row < old.nrows() {
                new.row_mut(new_row).assign(&old.row(old_row));
            }
        }
    }
}

/// Copies out shared factors for evaluation snapshots.
pub fn snapshot(user: &SharedMatrix, item: &SharedMatrix) -> (Array2<f32>, Array2<f32>) {
    (user.to_array(), item.to_array())
}
