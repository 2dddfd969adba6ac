//! Hyper-parameter search drivers
//!
//! Both drivers reset the estimator, overwrite its parameters with one
//! combination, refit, and keep a clone of the first strictly better model.

use super::{Estimator, ModelScore, ParamName, ParamValue, Params, ParamsGrid};
use crate::base::RandomGenerator;
use crate::error::Result;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ParamsSearchResult<M: Estimator> {
    pub best_model: Option<M>,
    pub best_score: Option<M::Score>,
    pub best_params: Params,
    pub best_index: Option<usize>,
    pub scores: Vec<M::Score>,
    pub params: Vec<Params>,
}

impl<M: Estimator> ParamsSearchResult<M> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            best_model: None,
            best_score: None,
            best_params: Params::new(),
            best_index: None,
            scores: Vec::with_capacity(capacity),
            params: Vec::with_capacity(capacity),
        }
    }

    fn add_score(&mut self, estimator: &M, params: &Params, score: M::Score) {
        let better = match &self.best_score {
            None => true,
            Some(best) => score.better_than(best),
        };
        if better {
            self.best_model = Some(estimator.clone());
            self.best_score = Some(score.clone());
            self.best_params = params.clone();
            self.best_index = Some(self.scores.len());
        }
        self.scores.push(score);
        self.params.push(params.clone());
    }
}

fn cross_validate<M: Estimator>(
    estimator: &mut M,
    train_set: &M::DataSet,
    test_set: &M::DataSet,
    params: &Params,
    config: &M::Config,
) -> Result<M::Score> {
    estimator.clear();
    let merged = estimator.params().overwrite(params);
    estimator.set_params(merged);
    estimator.fit(train_set, test_set, config)
}

/// Exhaustive depth-first search over the Cartesian product of `grid`.
pub fn grid_search_cv<M: Estimator>(
    estimator: &mut M,
    train_set: &M::DataSet,
    test_set: &M::DataSet,
    grid: &ParamsGrid,
    config: &M::Config,
) -> Result<ParamsSearchResult<M>> {
    let axes: Vec<(ParamName, &Vec<ParamValue>)> =
        grid.iter().map(|(name, values)| (*name, values)).collect();
    let total = grid.num_combinations();
    let mut results = ParamsSearchResult::with_capacity(total);
    let mut progress = 0;
    let mut params = Params::new();
    grid_dfs(
        estimator,
        train_set,
        test_set,
        config,
        &axes,
        0,
        &mut params,
        &mut progress,
        total,
        &mut results,
    )?;
    Ok(results)
}

#[allow(clippy::too_many_arguments)]
fn grid_dfs<M: Estimator>(
    estimator: &mut M,
    train_set: &M::DataSet,
    test_set: &M::DataSet,
    config: &M::Config,
    axes: &[(ParamName, &Vec<ParamValue>)],
    depth: usize,
    params: &mut Params,
    progress: &mut usize,
    total: usize,
    results: &mut ParamsSearchResult<M>,
) -> Result<()> {
    if depth == axes.len() {
        *progress += 1;
        info!(progress = *progress, total, params = %params, "grid search");
        let score = cross_validate(estimator, train_set, test_set, params, config)?;
        results.add_score(estimator, params, score);
        return Ok(());
    }
    let (name, values) = axes[depth];
    for value in values {
        params.insert(name, value.clone());
        grid_dfs(
            estimator,
            train_set,
            test_set,
            config,
            axes,
            depth + 1,
            params,
            progress,
            total,
            results,
        )?;
    }
    Ok(())
}

/// Evaluates `num_trials` uniformly drawn combinations (with replacement).
///
/// Falls back to [`grid_search_cv`] when the grid has no more combinations
/// than requested trials.
pub fn random_search_cv<M: Estimator>(
    estimator: &mut M,
    train_set: &M::DataSet,
    test_set: &M::DataSet,
    grid: &ParamsGrid,
    num_trials: usize,
    seed: u64,
    config: &M::Config,
) -> Result<ParamsSearchResult<M>> {
    if num_trials >= grid.num_combinations() {
        return grid_search_cv(estimator, train_set, test_set, grid, config);
    }
    let mut rng = RandomGenerator::new(seed);
    let mut results = ParamsSearchResult::with_capacity(num_trials);
    for trial in 1..=num_trials {
        let params: Params = grid
            .iter()
            .map(|(name, values)| (*name, values[rng.intn(values.len())].clone()))
            .collect();
        info!(trial, num_trials, params = %params, "random search");
        let score = cross_validate(estimator, train_set, test_set, &params, config)?;
        results.add_score(estimator, &params, score);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;

    #[derive(Debug, Clone, PartialEq)]
    struct Loss(f32);

    impl ModelScore for Loss {
        fn better_than(&self, other: &Self) -> bool {
            self.0 < other.0
        }

        fn is_nan(&self) -> bool {
            self.0.is_nan()
        }
    }

    /// Scores `(x - 3)^2 + (y - 1)^2`; cleared flag tracks reset calls.
    #[derive(Debug, Clone, Default)]
    struct Quadratic {
        params: Params,
        fitted: bool,
        clears: usize,
    }

    impl Model for Quadratic {
        fn set_params(&mut self, params: Params) {
            self.params = params;
        }

        fn params(&self) -> &Params {
            &self.params
        }

        fn params_grid(&self) -> ParamsGrid {
            ParamsGrid::new()
                .with(ParamName::NFactors, vec![1, 2, 3, 4])
                .with(ParamName::Reg, vec![0.0, 1.0, 2.0])
        }

        fn clear(&mut self) {
            self.fitted = false;
            self.clears += 1;
        }

        fn invalid(&self) -> bool {
            !self.fitted
        }
    }

    impl Estimator for Quadratic {
        type DataSet = ();
        type Score = Loss;
        type Config = ();

        fn fit(&mut self, _: &(), _: &(), _: &()) -> Result<Loss> {
            self.fitted = true;
            let x = self.params.get_int(ParamName::NFactors, 0) as f32;
            let y = self.params.get_float(ParamName::Reg, 0.0);
            Ok(Loss((x - 3.0).powi(2) + (y - 1.0).powi(2)))
        }
    }

    #[test]
    fn test_grid_search_cv() {
        let mut estimator = Quadratic::default();
        let grid = estimator.params_grid();
        let result = grid_search_cv(&mut estimator, &(), &(), &grid, &()).unwrap();

        assert_eq!(result.scores.len(), 12);
        assert_eq!(result.params.len(), 12);
        assert_eq!(estimator.clears, 12);
        assert_eq!(result.best_score, Some(Loss(0.0)));
        assert_eq!(result.best_params.get_int(ParamName::NFactors, 0), 3);
        assert_eq!(result.best_params.get_float(ParamName::Reg, -1.0), 1.0);
        let best_index = result.best_index.unwrap();
        assert_eq!(result.params[best_index], result.best_params);
        assert!(!result.best_model.unwrap().invalid());
    }

    #[test]
    fn test_grid_search_first_tie_wins() {
        let mut estimator = Quadratic::default();
        // (2, 1) and (4, 1) both score 1.0; (2, 1) is enumerated first.
        let grid = ParamsGrid::new()
            .with(ParamName::NFactors, vec![2, 4])
            .with(ParamName::Reg, vec![1.0]);
        let result = grid_search_cv(&mut estimator, &(), &(), &grid, &()).unwrap();
        assert_eq!(result.best_index, Some(0));
        assert_eq!(result.best_params.get_int(ParamName::NFactors, 0), 2);
    }

    #[test]
    fn test_random_search_delegates_to_grid() {
        let mut estimator = Quadratic::default();
        let grid = estimator.params_grid();
        let result = random_search_cv(&mut estimator, &(), &(), &grid, 12, 0, &()).unwrap();
        assert_eq!(result.scores.len(), 12);
        assert_eq!(result.best_score, Some(Loss(0.0)));
    }

    #[test]
    fn test_random_search_cv() {
        let mut estimator = Quadratic::default();
        let grid = estimator.params_grid();
        let result = random_search_cv(&mut estimator, &(), &(), &grid, 5, 42, &()).unwrap();
        assert_eq!(result.scores.len(), 5);
        let best = result.best_score.clone().unwrap();
        assert!(result.scores.iter().all(|s| !s.better_than(&best)));
        for params in &result.params {
            assert_eq!(params.len(), 2);
        }

        // same seed, same trials
        let mut again = Quadratic::default();
        let repeat = random_search_cv(&mut again, &(), &(), &grid, 5, 42, &()).unwrap();
        assert_eq!(repeat.params, result.params);
    }
}
