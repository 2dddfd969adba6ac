//! Implicit alternating least squares (weighted regularized MF).
//!
//! Confidence of an observed pair is `1 + α`. Each half-step holds one side
//! fixed and solves every row of the other side in closed form:
//! `x_u = (YᵀY + α·Σ_{i∈R(u)} y_i y_iᵀ + λI)⁻¹ · Σ_{i∈R(u)} (1 + α)·y_i`,
//! which is `(YᵀY + Yᵀ(Cᵘ−I)Y + λI) x_u = YᵀCᵘp(u)` for binary feedback.
//! Rows are independent, so workers write disjoint rows.

use super::dataset::DataSet;
use super::evaluator::{evaluate, Score};
use super::factors::{snapshot, Factors, InitParams};
use super::FitConfig;
use crate::base::{linalg, parallel, SharedMatrix};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::model::{
    decode_record, encode_record, BaseModel, Estimator, Model, ParamName, Params, ParamsGrid,
    SnapshotManager,
};
use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const FAMILY: &str = "als";

#[derive(Debug, Clone)]
pub struct Als {
    base: BaseModel,
    factors: Option<Factors>,
    n_factors: usize,
    n_epochs: usize,
    reg: f64,
    alpha: f64,
    init_mean: f32,
    init_std_dev: f32,
}

#[derive(Serialize, Deserialize)]
struct AlsRecord {
    params: Params,
    factors: Option<Factors>,
}

/// Normal-equation buffers of one worker.
struct Scratch {
    a: Array2<f64>,
    b: Array1<f64>,
}

impl Als {
    pub fn new(params: Params) -> Self {
        let mut als = Self {
            base: BaseModel::default(),
            factors: None,
            n_factors: 0,
            n_epochs: 0,
            reg: 0.0,
            alpha: 0.0,
            init_mean: 0.0,
            init_std_dev: 0.0,
        };
        als.set_params(params);
        als
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
            &AlsRecord {
                params: self.base.params.clone(),
                factors: self.factors.clone(),
            },
        )
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let record: AlsRecord = decode_record(FAMILY, buf)?;
        let mut als = Self::new(record.params);
        als.factors = record.factors;
        Ok(als)
    }

    /// Solves every row of `target` against the fixed `other` side.
    ///
    /// Returns the number of singular rows and the first failure; singular
    /// rows keep their previous value.
    fn solve_side<'a, F>(
        &self,
        n_rows: usize,
        adjacency: F,
        other: &Array2<f64>,
        target: &SharedMatrix,
        scratch: &[Mutex<Scratch>],
    ) -> (usize, Option<AppError>)
    where
        F: Fn(usize) -> &'a [usize] + Sync,
    {
        let k = self.n_factors;
        let gram = other.t().dot(other);
        let reg_eye = Array2::<f64>::eye(k) * self.reg;
        let singular = AtomicUsize::new(0);
        let result = parallel(n_rows, scratch.len(), |worker_id, row| {
            let mut guard = scratch[worker_id].lock();
            let Scratch { a, b } = &mut *guard;
            a.assign(&gram);
            b.fill(0.0);
            for &j in adjacency(row) {
                let y = other.row(j);
                for p in 0..k {
                    for q in 0..k {
                        a[[p, q]] += self.alpha * y[p] * y[q];
                    }
                    b[p] += (1.0 + self.alpha) * y[p];
                }
            }
            *a += &reg_eye;
            match linalg::inverse(a) {
                Ok(inv) => {
                    let x = inv.dot(&*b);
                    let values: Vec<f32> = x.iter().map(|&v| v as f32).collect();
                    target.write_row(row, &values);
                    Ok(())
                }
                Err(e) => {
                    singular.fetch_add(1, Ordering::Relaxed);
                    Err(e)
                }
            }
        });
        (singular.into_inner(), result.err())
    }

    fn report_singular(&self, epoch: usize, side: &str, singular: usize, err: Option<AppError>) {
        if let Some(e) = err {
            error!(model = FAMILY, epoch, side, singular_rows = singular, error = %e, "failed to invert matrix");
            metrics::record_singular_rows(FAMILY, singular as u64);
        }
    }
}

impl Model for Als {
    fn set_params(&mut self, params: Params) {
        self.n_factors = params.get_int(ParamName::NFactors, 15);
        self.n_epochs = params.get_int(ParamName::NEpochs, 50);
        self.init_mean = params.get_float(ParamName::InitMean, 0.0);
        self.init_std_dev = params.get_float(ParamName::InitStdDev, 0.1);
        self.reg = params.get_float(ParamName::Reg, 0.06) as f64;
        self.alpha = params.get_float(ParamName::Alpha, 0.001) as f64;
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

impl Estimator for Als {
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
            "fit als"
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
        let scratch: Vec<Mutex<Scratch>> = (0..n_jobs)
            .map(|_| {
                Mutex::new(Scratch {
                    a: Array2::zeros((self.n_factors, self.n_factors)),
                    b: Array1::zeros(self.n_factors),
                })
            })
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
        debug!(model = FAMILY, epoch = 0, n_epochs = self.n_epochs, ndcg = score.ndcg, precision = score.precision, recall = score.recall, "fit als");
        snapshots.add_snapshot(score, || snapshot(&user_factor, &item_factor));

        for epoch in 1..=self.n_epochs {
            let fit_start = Instant::now();
            let items = item_factor.to_array().mapv(f64::from);
            let (singular, err) = self.solve_side(
                train_set.user_count(),
                move |u| train_set.user_feedback(u),
                &items,
                &user_factor,
                &scratch,
            );
            self.report_singular(epoch, "user", singular, err);

            let users = user_factor.to_array().mapv(f64::from);
            let (singular, err) = self.solve_side(
                train_set.item_count(),
                move |i| train_set.item_feedback(i),
                &users,
                &item_factor,
                &scratch,
            );
            self.report_singular(epoch, "item", singular, err);

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
                    "fit als"
                );
                snapshots.add_snapshot(score, || snapshot(&user_factor, &item_factor));
            }
        }

        let (score, weights) = snapshots
            .into_best()
            .ok_or_else(|| AppError::Internal("no checkpoint was evaluated".to_string()))?;
        self.factors = Some(factors.with_weights(weights));
        metrics::observe_training_duration(FAMILY, start.elapsed());
        info!(model = FAMILY, ndcg = score.ndcg, precision = score.precision, recall = score.recall, "fit als complete");
        Ok(score)
    }
}
