//! Cyclic coordinate descent for implicit feedback (eALS style).
//!
//! Unobserved pairs share one weight `α`; the Gram matrix of the fixed side
//! accounts for them in O(k²), so each row update only walks its own
//! interactions. Each latent dimension is solved in closed form in turn.

use super::dataset::DataSet;
use super::evaluator::{evaluate, Score};
use super::factors::{snapshot, Factors, InitParams};
use super::FitConfig;
use crate::base::{parallel, SharedMatrix};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::model::{
    decode_record, encode_record, BaseModel, Estimator, Model, ParamName, Params, ParamsGrid,
    SnapshotManager,
};
use ndarray::Array2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const FAMILY: &str = "ccd";

#[derive(Debug, Clone)]
pub struct Ccd {
    base: BaseModel,
    factors: Option<Factors>,
    n_factors: usize,
    n_epochs: usize,
    reg: f32,
    alpha: f32,
    init_mean: f32,
    init_std_dev: f32,
}

#[derive(Serialize, Deserialize)]
struct CcdRecord {
    params: Params,
    factors: Option<Factors>,
}

/// Predictions and residuals indexed by the opposite side, plus the row being solved.
struct Scratch {
    predictions: Vec<f32>,
    residuals: Vec<f32>,
    row: Vec<f32>,
}

impl Scratch {
    fn new(n_opposite: usize, n_factors: usize) -> Self {
        Self {
            predictions: vec![0.0; n_opposite],
            residuals: vec![0.0; n_opposite],
            row: vec![0.0; n_factors],
        }
    }
}

impl Ccd {
    pub fn new(params: Params) -> Self {
        let mut ccd = Self {
            base: BaseModel::default(),
            factors: None,
            n_factors: 0,
            n_epochs: 0,
            reg: 0.0,
            alpha: 0.0,
            init_mean: 0.0,
            init_std_dev: 0.0,
        };
        ccd.set_params(params);
        ccd
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
            &CcdRecord {
                params: self.base.params.clone(),
                factors: self.factors.clone(),
            },
        )
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let record: CcdRecord = decode_record(FAMILY, buf)?;
        let mut ccd = Self::new(record.params);
        ccd.factors = record.factors;
        Ok(ccd)
    }

    /// Coordinate-wise update of every row of `target` with `other` fixed.
    fn update_side<'a, F>(
        &self,
        n_rows: usize,
        adjacency: F,
        other: &Array2<f32>,
        target: &SharedMatrix,
        scratch: &[Mutex<Scratch>],
    ) -> Result<()>
    where
        F: Fn(usize) -> &'a [usize] + Sync,
    {
        let k = self.n_factors;
        let (w, reg) = (self.alpha, self.reg);
        // S = Σ_j o_j o_jᵀ over the fixed side
        let s = other.t().dot(other);
        parallel::<_, AppError>(n_rows, scratch.len(), |worker_id, row| {
            let mut guard = scratch[worker_id].lock();
            let Scratch {
                predictions,
                residuals,
                row: p,
            } = &mut *guard;
            target.read_row(row, p);
            let neighbours = adjacency(row);
            for &j in neighbours {
                predictions[j] = (0..k).map(|f| p[f] * other[[j, f]]).sum();
            }
            for f in 0..k {
                for &j in neighbours {
                    residuals[j] = predictions[j] - p[f] * other[[j, f]];
                }
                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
                for &j in neighbours {
                    let o = other[[j, f]];
                    a += (1.0 - (1.0 - w) * residuals[j]) * o;
                    c += (1.0 - w) * o * o;
                }
                for q in 0..k {
                    if q != f {
                        b += w * p[q] * s[[q, f]];
                    }
                }
                p[f] = (a - b) / (c + w * s[[f, f]] + reg);
                for &j in neighbours {
                    predictions[j] = residuals[j] + p[f] * other[[j, f]];
                }
            }
            target.write_row(row, p);
            Ok(())
        })
    }
}

impl Model for Ccd {
    fn set_params(&mut self, params: Params) {
        self.n_factors = params.get_int(ParamName::NFactors, 15);
        self.n_epochs = params.get_int(ParamName::NEpochs, 50);
        self.init_mean = params.get_float(ParamName::InitMean, 0.0);
        self.init_std_dev = params.get_float(ParamName::InitStdDev, 0.1);
        self.reg = params.get_float(ParamName::Reg, 0.06);
        self.alpha = params.get_float(ParamName::Alpha, 0.001);
        self.base = BaseModel::new(params);
    }

    fn params(&self) -> &Params {
        &self.base.params
    }

    fn params_grid(&self) -> ParamsGrid {
        ParamsGrid::new()
            .with(ParamName::NFactors, vec![8, 16, 32, 64])
            .with(ParamName::InitMean, vec![0])
            .with(ParamName::InitStdDev, vec![0.001, 0.005, 0.01, 0.05, 0.1])
            .with(ParamName::Reg, vec![0.001, 0.005, 0.01, 0.05, 0.1])
            .with(ParamName::Alpha, vec![0.001, 0.005, 0.01, 0.05, 0.1])
    }

    fn clear(&mut self) {
        self.factors = None;
    }

    fn invalid(&self) -> bool {
        self.factors.is_none()
    }
}

impl Estimator for Ccd {
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
            "fit ccd"
        );
        let start = Instant::now();
        let n_jobs = config.jobs.max(1);
        let factors = Factors::init(
            self.factors.as_ref(),
            train_set,
            &mut self.base.rng,
            InitParams {
                n_factors: self.n_factors,
                init_mean: self.init_mean,
                init_std_dev: self.init_std_dev,
            },
        );
        let (user_factor, item_factor) = factors.to_shared();
        let user_scratch: Vec<Mutex<Scratch>> = (0..n_jobs)
            .map(|_| Mutex::new(Scratch::new(train_set.item_count(), self.n_factors)))
            .collect();
        let item_scratch: Vec<Mutex<Scratch>> = (0..n_jobs)
            .map(|_| Mutex::new(Scratch::new(train_set.user_count(), self.n_factors)))
            .collect();

        let mut snapshots = SnapshotManager::new();
        let score = evaluate(
            validate_set,
            train_set,
            config.top_k,
            config.candidates,
            n_jobs,
            |u, i| user_factor.dot_rows(u, &item_factor, i),
        )?;
        debug!(model = FAMILY, epoch = 0, n_epochs = self.n_epochs, ndcg = score.ndcg, precision = score.precision, recall = score.recall, "fit ccd");
        snapshots.add_snapshot(score, || snapshot(&user_factor, &item_factor));

        for epoch in 1..=self.n_epochs {
            let fit_start = Instant::now();
            let items = item_factor.to_array();
            self.update_side(
                train_set.user_count(),
                move |u| train_set.user_feedback(u),
                &items,
                &user_factor,
                &user_scratch,
            )?;
            let users = user_factor.to_array();
            self.update_side(
                train_set.item_count(),
                move |i| train_set.item_feedback(i),
                &users,
                &item_factor,
                &item_scratch,
            )?;

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
                    ndcg = score.ndcg,
                    precision = score.precision,
                    recall = score.recall,
                    "fit ccd"
                );
                snapshots.add_snapshot(score, || snapshot(&user_factor, &item_factor));
            }
        }

        let (score, weights) = snapshots
            .into_best()
            .ok_or_else(|| AppError::Internal("no checkpoint was evaluated".to_string()))?;
        self.factors = Some(factors.with_weights(weights));
        metrics::observe_training_duration(FAMILY, start.elapsed());
        info!(model = FAMILY, ndcg = score.ndcg, precision = score.precision, recall = score.recall, "fit ccd complete");
        Ok(score)
    }
}
