//! Personal ranking models trained on implicit feedback.

pub mod als;
pub mod bpr;
pub mod ccd;
pub mod dataset;
pub mod evaluator;
pub mod factors;
pub mod knn;
pub mod searcher;

use crate::error::{AppError, Result};
use crate::model::{peek_family, Estimator, Model, Params, ParamsGrid};

pub use als::Als;
pub use bpr::Bpr;
pub use ccd::Ccd;
pub use dataset::{DataSet, DataSetBuilder};
pub use evaluator::Score;
pub use knn::{Knn, Similarity};
pub use searcher::ModelSearcher;

/// Training options shared by all ranking models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitConfig {
    pub jobs: usize,
    /// Evaluate every `verbose` epochs.
    pub verbose: usize,
    pub candidates: usize,
    pub top_k: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            verbose: 10,
            candidates: 100,
            top_k: 10,
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

    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Epochs evaluated after epoch 0: every `verbose` epochs and the last one.
    pub fn is_checkpoint(&self, epoch: usize, n_epochs: usize) -> bool {
        epoch == n_epochs || epoch % self.verbose.max(1) == 0
    }
}

/// Closed set of ranking model families.
#[derive(Debug, Clone)]
pub enum RankingModel {
    Als(Als),
    Bpr(Bpr),
    Ccd(Ccd),
    Knn(Knn),
}

macro_rules! dispatch {
    ($model:expr, $inner:ident => $body:expr) => {
        match $model {
            RankingModel::Als($inner) => $body,
            RankingModel::Bpr($inner) => $body,
            RankingModel::Ccd($inner) => $body,
            RankingModel::Knn($inner) => $body,
        }
    };
}

impl RankingModel {
    /// Creates a model by family name: `als`, `bpr`, `ccd` or `knn`.
    pub fn new(name: &str, params: Params) -> Result<Self> {
        match name {
            als::FAMILY => Ok(Self::Als(Als::new(params))),
            bpr::FAMILY => Ok(Self::Bpr(Bpr::new(params))),
            ccd::FAMILY => Ok(Self::Ccd(Ccd::new(params))),
            knn::FAMILY => Ok(Self::Knn(Knn::new(params))),
            other => Err(AppError::UnknownModel(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Als(_) => als::FAMILY,
            Self::Bpr(_) => bpr::FAMILY,
            Self::Ccd(_) => ccd::FAMILY,
            Self::Knn(_) => knn::FAMILY,
        }
    }

    pub fn predict(&self, user_id: &str, item_id: &str) -> f32 {
        dispatch!(self, m => m.predict(user_id, item_id))
    }

    /// Ids known to the trained model, in dense order.
    pub fn item_ids(&self) -> Vec<String> {
        match self {
            Self::Als(m) => m.factors().map(|f| f.item_index.get_names()),
            Self::Bpr(m) => m.factors().map(|f| f.item_index.get_names()),
            Self::Ccd(m) => m.factors().map(|f| f.item_index.get_names()),
            Self::Knn(m) => m.neighbourhood().map(|n| n.item_index.get_names()),
        }
        .unwrap_or_default()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        dispatch!(self, m => m.encode())
    }

    /// Restores a model from any family's record.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let family = peek_family(buf)?;
        match family.as_str() {
            als::FAMILY => Ok(Self::Als(Als::decode(buf)?)),
            bpr::FAMILY => Ok(Self::Bpr(Bpr::decode(buf)?)),
            ccd::FAMILY => Ok(Self::Ccd(Ccd::decode(buf)?)),
            knn::FAMILY => Ok(Self::Knn(Knn::decode(buf)?)),
            other => Err(AppError::UnknownModel(other.to_string())),
        }
    }
}

impl Model for RankingModel {
    fn set_params(&mut self, params: Params) {
        dispatch!(self, m => m.set_params(params))
    }

    fn params(&self) -> &Params {
        dispatch!(self, m => m.params())
    }

    fn params_grid(&self) -> ParamsGrid {
        dispatch!(self, m => m.params_grid())
    }

    fn clear(&mut self) {
        dispatch!(self, m => m.clear())
    }

    fn invalid(&self) -> bool {
        dispatch!(self, m => m.invalid())
    }
}

impl Estimator for RankingModel {
    type DataSet = DataSet;
    type Score = Score;
    type Config = FitConfig;

    fn fit(&mut self, train_set: &DataSet, validate_set: &DataSet, config: &FitConfig) -> Result<Score> {
        dispatch!(self, m => m.fit(train_set, validate_set, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamName;

    #[test]
    fn test_checkpoints() {
        let config = FitConfig::default().with_verbose(3);
        let evaluated: Vec<usize> = (1..=7).filter(|&e| config.is_checkpoint(e, 7)).collect();
        assert_eq!(evaluated, vec![3, 6, 7]);

        let every = FitConfig::default().with_verbose(0);
        assert!((1..=4).all(|e| every.is_checkpoint(e, 4)));
    }

    #[test]
    fn test_new_model() {
        for name in ["als", "bpr", "ccd", "knn"] {
            let model = RankingModel::new(name, Params::new()).unwrap();
            assert_eq!(model.name(), name);
            assert!(model.invalid());
        }
        let err = RankingModel::new("svd", Params::new()).unwrap_err();
        assert!(matches!(err, AppError::UnknownModel(ref name) if name == "svd"));
    }

    #[test]
    fn test_decode_dispatches_by_family() {
        let mut builder = DataSetBuilder::new();
        for user in 0..6 {
            for item in 0..4 {
                if (user + item) % 2 == 0 {
                    builder.add_feedback(&format!("u{}", user), &format!("i{}", item)).unwrap();
                }
            }
        }
        let (train, test) = builder.build().split(0.5, 1);
        let mut model =
            RankingModel::new("ccd", Params::new().with(ParamName::NEpochs, 1)).unwrap();
        model.fit(&train, &test, &FitConfig::default()).unwrap();

        let decoded = RankingModel::decode(&model.encode().unwrap()).unwrap();
        assert_eq!(decoded.name(), "ccd");
        assert_eq!(decoded.params(), model.params());
        assert_eq!(decoded.predict("u0", "i0"), model.predict("u0", "i0"));
        assert_eq!(decoded.item_ids(), model.item_ids());
    }
}
