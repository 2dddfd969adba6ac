//! Item-based nearest neighbours.
//!
//! Item similarity is computed from co-occurrence in user histories. The
//! score of `(user, item)` is the summed similarity between `item` and the
//! items in the user's history that are among its `n_neighbors` neighbours.

use super::dataset::DataSet;
use super::evaluator::{evaluate, Score};
use super::FitConfig;
use crate::base::{parallel, Index};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::model::{
    decode_record, encode_record, BaseModel, Estimator, Model, ParamName, Params, ParamsGrid,
};
use crate::models::ScoredItem;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

pub const FAMILY: &str = "knn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Similarity {
    #[default]
    Cosine,
    Jaccard,
}

impl Similarity {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cosine" => Some(Self::Cosine),
            "jaccard" => Some(Self::Jaccard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Jaccard => "jaccard",
        }
    }

    /// `common` users shared by two items with `a` and `b` users each.
    fn compute(&self, common: u32, a: usize, b: usize) -> f32 {
        let common = common as f32;
        match self {
            Self::Cosine => common / ((a as f32) * (b as f32)).sqrt(),
            Self::Jaccard => common / (a as f32 + b as f32 - common),
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbourhood {
    pub user_index: Index,
    pub item_index: Index,
    /// Sorted item indices per user.
    pub user_items: Vec<Vec<usize>>,
    /// Top neighbours per item, descending by similarity.
    pub neighbors: Vec<Vec<(usize, f32)>>,
}

impl Neighbourhood {
    pub fn internal_predict(&self, user: usize, item: usize) -> f32 {
        let history = &self.user_items[user];
        self.neighbors[item]
            .iter()
            .filter(|(j, _)| history.binary_search(j).is_ok())
            .map(|(_, sim)| sim)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct Knn {
    base: BaseModel,
    similarity: Similarity,
    n_neighbors: usize,
    neighbourhood: Option<Neighbourhood>,
}

#[derive(Serialize, Deserialize)]
struct KnnRecord {
    params: Params,
    neighbourhood: Option<Neighbourhood>,
}

struct Scratch {
    counts: Vec<u32>,
    touched: Vec<usize>,
}

impl Knn {
    pub fn new(params: Params) -> Self {
        let mut knn = Self {
            base: BaseModel::default(),
            similarity: Similarity::default(),
            n_neighbors: 0,
            neighbourhood: None,
        };
        knn.set_params(params);
        knn
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    pub fn neighbourhood(&self) -> Option<&Neighbourhood> {
        self.neighbourhood.as_ref()
    }

    pub fn predict(&self, user_id: &str, item_id: &str) -> f32 {
        let Some(hood) = &self.neighbourhood else {
            warn!(model = FAMILY, "predict called on an untrained model");
            return 0.0;
        };
        match (hood.user_index.to_number(user_id), hood.item_index.to_number(item_id)) {
            (Some(user), Some(item)) => hood.internal_predict(user, item),
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

    /// Up to `n` nearest items of `item_id`, most similar first.
    pub fn similar_items(&self, item_id: &str, n: usize) -> Result<Vec<ScoredItem>> {
        let Some(hood) = &self.neighbourhood else {
            return Ok(Vec::new());
        };
        let Some(item) = hood.item_index.to_number(item_id) else {
            warn!(item_id, "unknown item");
            return Ok(Vec::new());
        };
        hood.neighbors[item]
            .iter()
            .take(n)
            .map(|&(j, sim)| Ok(ScoredItem::new(hood.item_index.to_name(j)?, sim)))
            .collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_record(
            FAMILY,
            &KnnRecord {
                params: self.base.params.clone(),
                neighbourhood: self.neighbourhood.clone(),
            },
        )
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let record: KnnRecord = decode_record(FAMILY, buf)?;
        let mut knn = Self::new(record.params);
        knn.neighbourhood = record.neighbourhood;
        Ok(knn)
    }

    fn build(&self, train_set: &DataSet, n_jobs: usize) -> Result<Neighbourhood> {
        let n_items = train_set.item_count();
        let scratch: Vec<Mutex<Scratch>> = (0..n_jobs)
            .map(|_| {
                Mutex::new(Scratch {
                    counts: vec![0; n_items],
                    touched: Vec::new(),
                })
            })
            .collect();
        let neighbors: Vec<Mutex<Vec<(usize, f32)>>> =
            (0..n_items).map(|_| Mutex::new(Vec::new())).collect();

        parallel::<_, AppError>(n_items, n_jobs, |worker_id, item| {
            let mut guard = scratch[worker_id].lock();
            let Scratch { counts, touched } = &mut *guard;
            for &user in train_set.item_feedback(item) {
                for &other in train_set.user_feedback(user) {
                    if other == item {
                        continue;
                    }
                    if counts[other] == 0 {
                        touched.push(other);
                    }
                    counts[other] += 1;
                }
            }
            let n_users = train_set.item_feedback(item).len();
            let mut scored: Vec<(usize, f32)> = touched
                .iter()
                .map(|&other| {
                    let sim = self.similarity.compute(
                        counts[other],
                        n_users,
                        train_set.item_feedback(other).len(),
                    );
                    (other, sim)
                })
                .collect();
            for &other in touched.iter() {
                counts[other] = 0;
            }
            touched.clear();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            scored.truncate(self.n_neighbors);
            *neighbors[item].lock() = scored;
            Ok(())
        })?;

        let user_items = (0..train_set.user_count())
            .map(|u| {
                let mut items = train_set.user_feedback(u).to_vec();
                items.sort_unstable();
                items
            })
            .collect();
        Ok(Neighbourhood {
            user_index: train_set.user_index().clone(),
            item_index: train_set.item_index().clone(),
            user_items,
            neighbors: neighbors.into_iter().map(Mutex::into_inner).collect(),
        })
    }
}

impl Model for Knn {
    fn set_params(&mut self, params: Params) {
        let name = params.get_str(ParamName::Similarity, Similarity::Cosine.as_str());
        self.similarity = Similarity::parse(&name).unwrap_or_else(|| {
            warn!(model = FAMILY, similarity = %name, "unknown similarity, use cosine");
            Similarity::Cosine
        });
        self.n_neighbors = params.get_int(ParamName::NNeighbors, 20);
        self.base = BaseModel::new(params);
    }

    fn params(&self) -> &Params {
        &self.base.params
    }

    fn params_grid(&self) -> ParamsGrid {
        ParamsGrid::new()
            .with(
                ParamName::Similarity,
                vec![Similarity::Cosine.as_str(), Similarity::Jaccard.as_str()],
            )
            .with(ParamName::NNeighbors, vec![10, 20, 50, 100])
    }

    fn clear(&mut self) {
        self.neighbourhood = None;
    }

    fn invalid(&self) -> bool {
        self.neighbourhood.is_none()
    }
}

impl Estimator for Knn {
    type DataSet = DataSet;
    type Score = Score;
    type Config = FitConfig;

    fn fit(&mut self, train_set: &DataSet, validate_set: &DataSet, config: &FitConfig) -> Result<Score> {
        info!(
            model = FAMILY,
            train_size = train_set.count(),
            validate_size = validate_set.count(),
            params = %self.base.params,
            n_jobs = config.jobs,
            "fit knn"
        );
        let start = Instant::now();
        let n_jobs = config.jobs.max(1);
        let hood = self.build(train_set, n_jobs)?;
        let score = evaluate(
            validate_set,
            train_set,
            config.top_k,
            config.candidates,
            n_jobs,
            |u, i| hood.internal_predict(u, i),
        )?;
        self.neighbourhood = Some(hood);
        metrics::observe_training_duration(FAMILY, start.elapsed());
        info!(model = FAMILY, similarity = %self.similarity, ndcg = score.ndcg, precision = score.precision, recall = score.recall, "fit knn complete");
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::dataset::DataSetBuilder;

    fn dataset(pairs: &[(&str, &str)]) -> DataSet {
        let mut builder = DataSetBuilder::new();
        for (user, item) in pairs {
            builder.add_feedback(user, item).unwrap();
        }
        builder.build()
    }

    #[test]
    fn test_similarity() {
        assert!((Similarity::Cosine.compute(2, 2, 8) - 0.5).abs() < 1e-6);
        assert!((Similarity::Jaccard.compute(2, 3, 3) - 0.5).abs() < 1e-6);
        assert_eq!(Similarity::parse("jaccard"), Some(Similarity::Jaccard));
        assert_eq!(Similarity::parse("pearson"), None);
    }

    #[test]
    fn test_similar_items() {
        // x and y always co-occur; z only shares one user with x
        let train = dataset(&[
            ("a", "x"),
            ("a", "y"),
            ("b", "x"),
            ("b", "y"),
            ("c", "x"),
            ("c", "z"),
        ]);
        let mut knn = Knn::new(Params::new().with(ParamName::Similarity, "jaccard"));
        knn.fit(&train, &DataSetBuilder::new().build(), &FitConfig::default().with_jobs(2))
            .unwrap();

        let similar = knn.similar_items("x", 10).unwrap();
        let ids: Vec<&str> = similar.iter().map(|s| s.item_id.as_str()).collect();
        assert_eq!(ids, vec!["y", "z"]);
        assert!((similar[0].score - 2.0 / 3.0).abs() < 1e-6);
        assert!((similar[1].score - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(knn.similar_items("x", 1).unwrap().len(), 1);
        assert!(knn.similar_items("nothing", 3).unwrap().is_empty());
    }

    #[test]
    fn test_predict_sums_neighbour_similarity() {
        let train = dataset(&[("a", "x"), ("a", "y"), ("b", "x"), ("b", "y"), ("c", "z"), ("c", "y")]);
        let mut knn = Knn::new(Params::new());
        knn.fit(&train, &DataSetBuilder::new().build(), &FitConfig::default())
            .unwrap();
        // c holds z and y; x is similar to y only
        let expected = 2.0 / (2.0f32 * 3.0).sqrt();
        assert!((knn.predict("c", "x") - expected).abs() < 1e-6);
        assert_eq!(knn.predict("nobody", "x"), 0.0);
    }

    #[test]
    fn test_neighbour_limit_and_roundtrip() {
        let train = dataset(&[("a", "x"), ("a", "y"), ("a", "z"), ("a", "w")]);
        let mut knn = Knn::new(Params::new().with(ParamName::NNeighbors, 2));
        assert!(knn.invalid());
        knn.fit(&train, &DataSetBuilder::new().build(), &FitConfig::default())
            .unwrap();
        let hood = knn.neighbourhood().unwrap();
        assert!(hood.neighbors.iter().all(|n| n.len() == 2));

        let decoded = Knn::decode(&knn.encode().unwrap()).unwrap();
        assert_eq!(decoded.neighbourhood(), knn.neighbourhood());
        assert_eq!(decoded.similarity(), Similarity::Cosine);
    }
}
