use super::dataset::DataSet;
use super::evaluator::Score;
use super::knn::{self, Similarity};
use super::{bpr, ccd, FitConfig, RankingModel};
use crate::error::Result;
use crate::model::{random_search_cv, Model, ModelScore, ParamName, Params};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::info;

/// Families tried by [`ModelSearcher::fit`], in order.
pub const SEARCH_MODELS: [&str; 3] = [bpr::FAMILY, ccd::FAMILY, knn::FAMILY];

#[derive(Debug, Clone)]
pub struct SearchedModel {
    pub name: &'static str,
    pub model: RankingModel,
    pub score: Score,
}

#[derive(Debug, Default)]
struct Best {
    model: Option<SearchedModel>,
    similarity: Similarity,
}

/// Random search over several ranking families under one budget.
///
/// The best result sits behind its own lock so it can be read while another
/// search is running.
#[derive(Debug)]
pub struct ModelSearcher {
    n_epochs: usize,
    n_trials: usize,
    n_jobs: usize,
    best: Mutex<Best>,
}

impl ModelSearcher {
    pub fn new(n_epochs: usize, n_trials: usize, n_jobs: usize) -> Self {
        Self {
            n_epochs,
            n_trials,
            n_jobs,
            best: Mutex::new(Best::default()),
        }
    }

    pub fn best_model(&self) -> Option<SearchedModel> {
        self.best.lock().model.clone()
    }

    /// Similarity of the best neighbourhood model, cosine until one is found.
    pub fn best_similarity(&self) -> Similarity {
        self.best.lock().similarity
    }

    pub fn fit(&self, train_set: &DataSet, validate_set: &DataSet) -> Result<()> {
        info!(
            n_users = train_set.user_count(),
            n_items = train_set.item_count(),
            n_trials = self.n_trials,
            "ranking model search"
        );
        let start = Instant::now();
        let config = FitConfig::default().with_jobs(self.n_jobs);
        for name in SEARCH_MODELS {
            let mut model =
                RankingModel::new(name, Params::new().with(ParamName::NEpochs, self.n_epochs))?;
            let grid = model.params_grid();
            let result = random_search_cv(
                &mut model,
                train_set,
                validate_set,
                &grid,
                self.n_trials,
                0,
                &config,
            )?;
            let (Some(best_model), Some(score)) = (result.best_model, result.best_score) else {
                continue;
            };

            let mut best = self.best.lock();
            if let RankingModel::Knn(knn) = &best_model {
                best.similarity = knn.similarity();
            }
            let replace = match &best.model {
                None => true,
                Some(current) => score.better_than(&current.score),
            };
            if replace {
                best.model = Some(SearchedModel {
                    name,
                    model: best_model,
                    score,
                });
            }
        }

        let best = self.best.lock();
        if let Some(searched) = &best.model {
            info!(
                model = searched.name,
                ndcg = searched.score.ndcg,
                precision = searched.score.precision,
                recall = searched.score.recall,
                params = %searched.model.params(),
                search_time_ms = start.elapsed().as_millis() as u64,
                "complete ranking model search"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::dataset::DataSetBuilder;

    fn communities() -> (DataSet, DataSet) {
        let mut builder = DataSetBuilder::new();
        for user in 0..30 {
            for item in 0..12 {
                if item % 3 == user % 3 && (item + user) % 4 != 0 {
                    builder.add_feedback(&format!("u{}", user), &format!("i{}", item)).unwrap();
                }
            }
        }
        builder.build().split(0.5, 3)
    }

    #[test]
    fn test_search_keeps_best_family() {
        let (train, test) = communities();
        let searcher = ModelSearcher::new(2, 2, 2);
        assert!(searcher.best_model().is_none());
        assert_eq!(searcher.best_similarity(), Similarity::Cosine);

        searcher.fit(&train, &test).unwrap();
        let best = searcher.best_model().unwrap();
        assert!(SEARCH_MODELS.contains(&best.name));
        assert_eq!(best.model.name(), best.name);
        assert!(!best.model.invalid());

        assert!(!best.score.is_nan());
    }

    #[test]
    fn test_best_model_is_a_snapshot() {
        let (train, test) = communities();
        let searcher = ModelSearcher::new(1, 1, 1);
        searcher.fit(&train, &test).unwrap();
        let mut best = searcher.best_model().unwrap();
        best.model.clear();
        // clearing the returned copy leaves the searcher's model intact
        assert!(!searcher.best_model().unwrap().model.invalid());
    }
}
