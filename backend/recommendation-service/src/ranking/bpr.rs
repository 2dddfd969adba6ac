//! Bayesian Personalized Ranking
//!
//! Pairwise matrix factorization for implicit feedback. The probability that
//! user u prefers item i over item j is modelled as σ(p_uᵀ(q_i − q_j)).
//!
//! Defaults: n_factors 10, n_epochs 100, lr 0.05, reg 0.01, init_mean 0,
//! init_std 0.001.

use super::dataset::DataSet;
use super::evaluator::{evaluate, Score};
use super::factors::{snapshot, Factors, InitParams};
use super::FitConfig;
use crate::base::{parallel, AtomicF32, RandomGenerator};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::model::{
    decode_record, encode_record, BaseModel, Estimator, Model, ParamName, Params, ParamsGrid,
    SnapshotManager,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const FAMILY: &str = "bpr";

#[derive(Debug, Clone)]
pub struct Bpr {
    base: BaseModel,
    factors: Option<Factors>,
    n_factors: usize,
    n_epochs: usize,
    lr: f32,
    reg: f32,
    init_mean: f32,
    init_std_dev: f32,
}

#[derive(Serialize, Deserialize)]
struct BprRecord {
    params: Params,
    factors: Option<Factors>,
}

/// Per-worker temporaries.
struct Scratch {
    rng: RandomGenerator,
    user: Vec<f32>,
    positive: Vec<f32>,
    negative: Vec<f32>,
    delta: Vec<f32>,
}

impl Scratch {
    fn new(n_factors: usize, seed: u64) -> Self {
        Self {
            rng: RandomGenerator::new(seed),
            user: vec![0.0; n_factors],
            positive: vec![0.0; n_factors],
            negative: vec![0.0; n_factors],
            delta: vec![0.0; n_factors],
        }
    }
}

impl Bpr {
    pub fn new(params: Params) -> Self {
        let mut bpr = Self {
            base: BaseModel::default(),
            factors: None,
            n_factors: 0,
            n_epochs: 0,
            lr: 0.0,
            reg: 0.0,
            init_mean: 0.0,
            init_std_dev: 0.0,
        };
        bpr.set_params(params);
        bpr
    }

    pub fn factors(&self) -> Option<&Factors> {
        self.factors.as_ref()
    }

    pub fn predict(&self, user_id: &str, item_id: &str) -> f32 {
        match &self.factors {
            Some(factors) => factors.predict(user_id, item_id),
            None => {
                warn!(model = FAMILY, "predict called on an untrained model");
                0.0
            }
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_record(
            FAMILY,
            &BprRecord {
                params: self.base.params.clone(),
                factors: self.factors.clone(),
            },
        )
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let record: BprRecord = decode_record(FAMILY, buf)?;
        let mut bpr = Self::new(record.params);
        bpr.factors = record.factors;
        Ok(bpr)
    }

    fn init_params(&self) -> InitParams {
        InitParams {
            n_factors: self.n_factors,
            init_mean: self.init_mean,
            init_std_dev: self.init_std_dev,
        }
    }
}

impl Model for Bpr {
    fn set_params(&mut self, params: Params) {
        self.n_factors = params.get_int(ParamName::NFactors, 10);
        self.n_epochs = params.get_int(ParamName::NEpochs, 100);
        self.lr = params.get_float(ParamName::Lr, 0.05);
        self.reg = params.get_float(ParamName::Reg, 0.01);
        self.init_mean = params.get_float(ParamName::InitMean, 0.0);
        self.init_std_dev = params.get_float(ParamName::InitStdDev, 0.001);
        self.base = BaseModel::new(params);
    }

    fn params(&self) -> &Params {
        &self.base.params
    }

    fn params_grid(&self) -> ParamsGrid {
        ParamsGrid::new()
            .with(ParamName::NFactors, vec![8, 16, 32, 64])
            .with(ParamName::Lr, vec![0.001, 0.005, 0.01, 0.05, 0.1])
            .with(ParamName::Reg, vec![0.001, 0.005, 0.01, 0.05, 0.1])
            .with(ParamName::InitMean, vec![0])
            .with(ParamName::InitStdDev, vec![0.001, 0.005, 0.01, 0.05, 0.1])
    }

    fn clear(&mut self) {
        self.factors = None;
    }

    fn invalid(&self) -> bool {
        self.factors.is_none()
    }
}

impl Estimator for Bpr {
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
            "fit bpr"
        );
        let start = Instant::now();
        let n_jobs = config.jobs.max(1);
        let init_params = self.init_params();
        let factors = Factors::init(
            self.factors.as_ref(),
            train_set,
            &mut self.base.rng,
            init_params,
        );
        let (user_factor, item_factor) = factors.to_shared();
        let scratch: Vec<Mutex<Scratch>> = (0..n_jobs)
            .map(|_| Mutex::new(Scratch::new(self.n_factors, self.base.rng.next_seed())))
            .collect();
        let user_items: Vec<HashSet<usize>> = (0..train_set.user_count())
            .map(|u| train_set.user_feedback(u).iter().copied().collect())
            .collect();
        // users with at least one positive and at least one possible negative
        let active_users: Vec<usize> = (0..train_set.user_count())
            .filter(|&u| !user_items[u].is_empty() && user_items[u].len() < train_set.item_count())
            .collect();
        let (lr, reg) = (self.lr, self.reg);

        let mut snapshots = SnapshotManager::new();
        let score = evaluate(
            validate_set,
            train_set,
            config.top_k,
            config.candidates,
            n_jobs,
            |u, i| user_factor.dot_rows(u, &item_factor, i),
        )?;
        debug!(model = FAMILY, epoch = 0, n_epochs = self.n_epochs, ndcg = score.ndcg, precision = score.precision, recall = score.recall, "fit bpr");
        snapshots.add_snapshot(score, || snapshot(&user_factor, &item_factor));

        if active_users.is_empty() {
            warn!(model = FAMILY, "no user has both positive and negative items, skip training");
        }

        for epoch in 1..=self.n_epochs {
            if active_users.is_empty() {
                break;
            }
            let fit_start = Instant::now();
            let costs: Vec<AtomicF32> = (0..n_jobs).map(|_| AtomicF32::new(0.0)).collect();
            parallel::<_, AppError>(train_set.count(), n_jobs, |worker_id, _| {
                let mut guard = scratch[worker_id].lock();
                let Scratch {
                    rng,
                    user,
                    positive,
                    negative,
                    delta,
                } = &mut *guard;
                let user_index = active_users[rng.intn(active_users.len())];
                let items = train_set.user_feedback(user_index);
                let positive_index = items[rng.intn(items.len())];
                let negative_index = loop {
                    let candidate = rng.intn(train_set.item_count());
                    if !user_items[user_index].contains(&candidate) {
                        break candidate;
                    }
                };

                user_factor.read_row(user_index, user);
                item_factor.read_row(positive_index, positive);
                item_factor.read_row(negative_index, negative);
                let diff = dot(user, positive) - dot(user, negative);
                costs[worker_id].add((1.0 + (-diff).exp()).ln());
                let grad = 1.0 / (1.0 + diff.exp());

                // q_i += lr·(g·p_u − reg·q_i)
                for f in 0..delta.len() {
                    delta[f] = grad * user[f] - reg * positive[f];
                }
                item_factor.add_scaled_row(positive_index, lr, delta);
                // q_j += lr·(−g·p_u − reg·q_j)
                for f in 0..delta.len() {
                    delta[f] = -grad * user[f] - reg * negative[f];
                }
                item_factor.add_scaled_row(negative_index, lr, delta);
                // p_u += lr·(g·(q_i − q_j) − reg·p_u)
                for f in 0..delta.len() {
                    delta[f] = grad * (positive[f] - negative[f]) - reg * user[f];
                }
                user_factor.add_scaled_row(user_index, lr, delta);
                Ok(())
            })?;
            let cost: f32 = costs.iter().map(AtomicF32::load).sum();

            if config.is_checkpoint(epoch, self.n_epochs) {
                let score = evaluate(
                    validate_set,
                    train_set,
                    config.top_k,
                    config.candidates,
                    n_jobs,
                    |u, i| user_factor.dot_rows(u, &item_factor, i),
                )?;
                debug!(
                    model = FAMILY,
                    epoch,
                    n_epochs = self.n_epochs,
                    fit_time_ms = fit_start.elapsed().as_millis() as u64,
                    cost,
                    ndcg = score.ndcg,
                    precision = score.precision,
                    recall = score.recall,
                    "fit bpr"
                );
                snapshots.add_snapshot(score, || snapshot(&user_factor, &item_factor));
            }
        }

        let (score, weights) = snapshots
            .into_best()
            .ok_or_else(|| AppError::Internal("no checkpoint was evaluated".to_string()))?;
        self.factors = Some(factors.with_weights(weights));
        metrics::observe_training_duration(FAMILY, start.elapsed());
        info!(model = FAMILY, ndcg = score.ndcg, precision = score.precision, recall = score.recall, "fit bpr complete");
        Ok(score)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::dataset::DataSetBuilder;

    /// Two disjoint communities: users prefer the items of their own group.
    fn communities() -> (DataSet, DataSet) {
        let mut builder = DataSetBuilder::new();
        for user in 0..40 {
            let group = user % 2;
            for item in 0..20 {
                if item % 2 == group && (item + user) % 5 != 0 {
                    builder.add_feedback(&format!("u{}", user), &format!("i{}", item)).unwrap();
                }
            }
        }
        builder.build().split(0.5, 0)
    }

    #[test]
    fn test_fit_never_worse_than_initial() {
        let (train, test) = communities();
        let config = FitConfig::default().with_jobs(2).with_verbose(5);
        let params = Params::new().with(ParamName::NFactors, 8);
        // zero epochs only evaluates the initial factors
        let mut initial = Bpr::new(params.clone().with(ParamName::NEpochs, 0));
        let initial_score = initial.fit(&train, &test, &config).unwrap();

        let mut bpr = Bpr::new(params.with(ParamName::NEpochs, 30));
        let score = bpr.fit(&train, &test, &config).unwrap();
        assert!(score.ndcg + 1e-6 >= initial_score.ndcg);
        assert!(!bpr.invalid());
    }

    #[test]
    fn test_encode_decode() {
        let (train, test) = communities();
        let mut bpr = Bpr::new(Params::new().with(ParamName::NEpochs, 2));
        bpr.fit(&train, &test, &FitConfig::default()).unwrap();

        let decoded = Bpr::decode(&bpr.encode().unwrap()).unwrap();
        assert_eq!(decoded.params(), bpr.params());
        assert_eq!(decoded.factors(), bpr.factors());
        assert_eq!(decoded.predict("u1", "i3"), bpr.predict("u1", "i3"));
    }

    #[test]
    fn test_clear() {
        let (train, test) = communities();
        let mut bpr = Bpr::new(Params::new().with(ParamName::NEpochs, 1));
        assert!(bpr.invalid());
        bpr.fit(&train, &test, &FitConfig::default()).unwrap();
        assert!(!bpr.invalid());
        bpr.clear();
        assert!(bpr.invalid());
        assert_eq!(bpr.predict("u1", "i3"), 0.0);
    }
}
