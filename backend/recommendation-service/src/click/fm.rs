//! Second-order factorization machine trained by Hogwild SGD.
//!
//! `ŷ(x) = w₀ + Σᵢ wᵢ + ½ Σ_f [(Σᵢ v_{i,f})² − Σᵢ v_{i,f}²]` over the active
//! positions `x` of a sample (all feature values are 1).

use super::dataset::ClickDataSet;
use super::evaluator::{evaluate_classification, evaluate_regression, Score};
use super::unified_index::UnifiedIndex;
use super::{FitConfig, Task};
use crate::base::{batch_parallel, AtomicF32, SharedMatrix, SharedVector};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::model::{
    decode_record, encode_record, BaseModel, Estimator, Model, ModelScore, ParamName, Params,
    ParamsGrid, SnapshotManager,
};
use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const FAMILY: &str = "fm";

const BATCH_SIZE: usize = 128;

/// Trained parameters with the index that addresses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmWeights {
    pub index: UnifiedIndex,
    pub v: Array2<f32>,
    pub w: Array1<f32>,
    pub b: f32,
    pub min_target: f32,
    pub max_target: f32,
}

#[derive(Debug, Clone)]
pub struct Fm {
    base: BaseModel,
    task: Task,
    weights: Option<FmWeights>,
    n_factors: usize,
    n_epochs: usize,
    lr: f32,
    reg: f32,
    init_mean: f32,
    init_std_dev: f32,
    use_feature: bool,
}

#[derive(Serialize, Deserialize)]
struct FmRecord {
    task: Task,
    params: Params,
    weights: Option<FmWeights>,
}

struct Scratch {
    sum: Vec<f32>,
    row: Vec<f32>,
    v_grad: Vec<f32>,
}

/// Raw model output for the active positions `x`.
fn raw_predict<W, V>(b: f32, x: &[usize], n_factors: usize, w: W, v: V) -> f32
where
    W: Fn(usize) -> f32,
    V: Fn(usize, usize) -> f32,
{
    let mut pred = b + x.iter().map(|&i| w(i)).sum::<f32>();
    let mut pairwise = 0.0;
    for f in 0..n_factors {
        let (mut sum, mut sum_sq) = (0.0f32, 0.0f32);
        for &i in x {
            let value = v(i, f);
            sum += value;
            sum_sq += value * value;
        }
        pairwise += sum * sum - sum_sq;
    }
    pred += pairwise / 2.0;
    pred
}

impl FmWeights {
    fn raw_predict(&self, x: &[usize]) -> f32 {
        raw_predict(self.b, x, self.v.ncols(), |i| self.w[i], |i, f| self.v[[i, f]])
    }
}

impl Fm {
    pub fn new(task: Task, params: Params) -> Self {
        let mut fm = Self {
            base: BaseModel::default(),
            task,
            weights: None,
            n_factors: 0,
            n_epochs: 0,
            lr: 0.0,
            reg: 0.0,
            init_mean: 0.0,
            init_std_dev: 0.0,
            use_feature: true,
        };
        fm.set_params(params);
        fm
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn weights(&self) -> Option<&FmWeights> {
        self.weights.as_ref()
    }

    /// Unknown user, item or label ids contribute nothing.
    pub fn predict(&self, user_id: &str, item_id: &str, labels: &[String]) -> f32 {
        let Some(weights) = &self.weights else {
            warn!(model = FAMILY, "predict called on an untrained model");
            return 0.0;
        };
        let index = &weights.index;
        let mut x = Vec::with_capacity(2 + labels.len());
        match index.encode_user(user_id) {
            Some(u) => x.push(u),
            None => warn!(user_id, "unknown user"),
        }
        match index.encode_item(item_id) {
            Some(i) => x.push(i),
            None => warn!(item_id, "unknown item"),
        }
        if self.use_feature {
            x.extend(labels.iter().filter_map(|l| index.encode_label(l)));
        }
        self.internal_predict(weights, &x)
    }

    fn internal_predict(&self, weights: &FmWeights, x: &[usize]) -> f32 {
        let pred = weights.raw_predict(self.active(x));
        self.clamp(pred, weights.min_target, weights.max_target)
    }

    /// Keeps `[user, item]` only when label features are disabled.
    fn active<'a>(&self, x: &'a [usize]) -> &'a [usize] {
        if self.use_feature {
            x
        } else {
            &x[..x.len().min(2)]
        }
    }

    fn clamp(&self, pred: f32, min_target: f32, max_target: f32) -> f32 {
        match self.task {
            Task::Regression => pred.clamp(min_target, max_target),
            Task::Classification => pred,
        }
    }

    fn evaluate<F>(&self, test_set: &ClickDataSet, predict: F) -> Score
    where
        F: Fn(&[usize]) -> f32,
    {
        match self.task {
            Task::Regression => evaluate_regression(test_set, predict),
            Task::Classification => evaluate_classification(test_set, predict),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_record(
            FAMILY,
            &FmRecord {
                task: self.task,
                params: self.base.params.clone(),
                weights: self.weights.clone(),
            },
        )
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let record: FmRecord = decode_record(FAMILY, buf)?;
        let mut fm = Self::new(record.task, record.params);
        fm.weights = record.weights;
        Ok(fm)
    }

    /// Random `V`, zero `w`; rows of names known to the previous weights are
    /// carried over unless the factor width changed.
    fn init(&mut self, train_set: &ClickDataSet) -> (Array2<f32>, Array1<f32>) {
        let index = train_set.index();
        let mut v = self
            .base
            .rng
            .normal_matrix(index.len(), self.n_factors, self.init_mean, self.init_std_dev);
        let mut w = Array1::zeros(index.len());
        if let Some(previous) = &self.weights {
            if previous.v.ncols() == self.n_factors {
                let old = &previous.index;
                let pairs = index
                    .get_users()
                    .iter()
                    .filter_map(|id| Some((old.encode_user(id)?, index.encode_user(id)?)))
                    .chain(
                        index
                            .get_items()
                            .iter()
                            .filter_map(|id| Some((old.encode_item(id)?, index.encode_item(id)?))),
                    )
                    .chain(
                        index
                            .get_labels()
                            .iter()
                            .filter_map(|l| Some((old.encode_label(l)?, index.encode_label(l)?))),
                    );
                for (old_row, new_row) in pairs {
                    w[new_row] = previous.w[old_row];
                    v.row_mut(new_row).assign(&previous.v.row(old_row));
                }
            }
        }
        (v, w)
    }
}

impl Model for Fm {
    fn set_params(&mut self, params: Params) {
        self.n_factors = params.get_int(ParamName::NFactors, 128);
        self.n_epochs = params.get_int(ParamName::NEpochs, 200);
        self.lr = params.get_float(ParamName::Lr, 0.01);
        self.reg = params.get_float(ParamName::Reg, 0.0);
        self.init_mean = params.get_float(ParamName::InitMean, 0.0);
        self.init_std_dev = params.get_float(ParamName::InitStdDev, 0.01);
        self.use_feature = params.get_bool(ParamName::UseFeature, true);
        self.base = BaseModel::new(params);
    }

    fn params(&self) -> &Params {
        &self.base.params
    }

    fn params_grid(&self) -> ParamsGrid {
        ParamsGrid::new()
            .with(ParamName::NFactors, vec![8, 16, 32, 64, 128])
            .with(ParamName::Lr, vec![0.001, 0.005, 0.01, 0.05, 0.1])
            .with(ParamName::Reg, vec![0.001, 0.005, 0.01, 0.05, 0.1])
            .with(ParamName::InitMean, vec![0])
            .with(ParamName::InitStdDev, vec![0.001, 0.005, 0.01, 0.05, 0.1])
    }

    fn clear(&mut self) {
        self.weights = None;
    }

    fn invalid(&self) -> bool {
        self.weights.is_none()
    }
}

impl Estimator for Fm {
    type DataSet = ClickDataSet;
    type Score = Score;
    type Config = FitConfig;

    fn fit(&mut self, train_set: &ClickDataSet, test_set: &ClickDataSet, config: &FitConfig) -> Result<Score> {
        info!(
            model = FAMILY,
            train_size = train_set.count(),
            test_size = test_set.count(),
            task = %self.task,
            params = %self.base.params,
            n_jobs = config.jobs,
            "fit fm"
        );
        let start = Instant::now();
        let n_jobs = config.jobs.max(1);
        let (v, w) = self.init(train_set);
        let (min_target, max_target) = if train_set.count() == 0 {
            (0.0, 0.0)
        } else {
            train_set
                .targets()
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)))
        };
        let v = SharedMatrix::from_array(&v);
        let w = SharedVector::from_array(&w);
        let b = AtomicF32::new(0.0);
        let k = self.n_factors;
        let scratch: Vec<Mutex<Scratch>> = (0..n_jobs)
            .map(|_| {
                Mutex::new(Scratch {
                    sum: vec![0.0; k],
                    row: vec![0.0; k],
                    v_grad: vec![0.0; k],
                })
            })
            .collect();
        let (lr, reg, task) = (self.lr, self.reg, self.task);

        let shared_predict = |x: &[usize]| {
            let pred = raw_predict(b.load(), self.active(x), k, |i| w.get(i), |i, f| v.get(i, f));
            self.clamp(pred, min_target, max_target)
        };
        let snapshot = || (v.to_array(), w.to_array(), b.load());

        let mut snapshots = SnapshotManager::new();
        let score = self.evaluate(test_set, shared_predict);
        debug!(model = FAMILY, epoch = 0, n_epochs = self.n_epochs, metric = score.name(), value = score.value(), "fit fm");
        snapshots.add_snapshot(score, snapshot);

        for epoch in 1..=self.n_epochs {
            let fit_start = Instant::now();
            let costs: Vec<AtomicF32> = (0..n_jobs).map(|_| AtomicF32::new(0.0)).collect();
            batch_parallel::<_, AppError>(train_set.count(), n_jobs, BATCH_SIZE, |worker_id, begin, end| {
                let mut guard = scratch[worker_id].lock();
                let Scratch { sum, row, v_grad } = &mut *guard;
                for sample in begin..end {
                    let (features, target) = train_set.get(sample);
                    let x = self.active(features);
                    let prediction = raw_predict(b.load(), x, k, |i| w.get(i), |i, f| v.get(i, f));
                    let grad = match task {
                        Task::Regression => {
                            let grad = prediction - target;
                            costs[worker_id].add(grad * grad / 2.0);
                            grad
                        }
                        Task::Classification => {
                            // logistic loss for targets in {-1, +1}
                            costs[worker_id].add((1.0 + (-target * prediction).exp()).ln());
                            -target * (1.0 - 1.0 / (1.0 + (-target * prediction).exp()))
                        }
                    };
                    // Σ_j v_j
                    sum.fill(0.0);
                    for &j in x {
                        v.read_row(j, row);
                        for (s, r) in sum.iter_mut().zip(row.iter()) {
                            *s += r;
                        }
                    }
                    b.add(-lr * grad);
                    for &i in x {
                        w.add(i, -lr * grad);
                        v.read_row(i, row);
                        for f in 0..k {
                            v_grad[f] = (sum[f] - row[f]) * grad + reg * row[f];
                        }
                        v.add_scaled_row(i, -lr, v_grad);
                    }
                }
                Ok(())
            })?;
            let cost: f32 = costs.iter().map(AtomicF32::load).sum();

            if config.is_checkpoint(epoch, self.n_epochs) {
                let score = self.evaluate(test_set, shared_predict);
                debug!(
                    model = FAMILY,
                    epoch,
                    n_epochs = self.n_epochs,
                    fit_time_ms = fit_start.elapsed().as_millis() as u64,
                    loss = cost,
                    metric = score.name(),
                    value = score.value(),
                    "fit fm"
                );
                if cost.is_nan() || score.is_nan() {
                    warn!(model = FAMILY, epoch, lr = self.lr, "model diverged");
                    metrics::record_diverged(FAMILY);
                    break;
                }
                snapshots.add_snapshot(score, snapshot);
            }
        }

        let (score, (v, w, b)) = snapshots
            .into_best()
            .ok_or_else(|| AppError::Internal("no checkpoint was evaluated".to_string()))?;
        self.weights = Some(FmWeights {
            index: train_set.index().clone(),
            v,
            w,
            b,
            min_target,
            max_target,
        });
        metrics::observe_training_duration(FAMILY, start.elapsed());
        info!(model = FAMILY, metric = score.name(), value = score.value(), "fit fm complete");
        Ok(score)
    }
}
