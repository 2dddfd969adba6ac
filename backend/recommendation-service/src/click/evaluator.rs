use super::dataset::ClickDataSet;
use super::Task;
use crate::model::ModelScore;
use serde::{Deserialize, Serialize};

/// RMSE for regression, precision of positive predictions for classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub task: Task,
    pub rmse: f32,
    pub precision: f32,
}

impl Score {
    pub fn name(&self) -> &'static str {
        match self.task {
            Task::Regression => "rmse",
            Task::Classification => "precision",
        }
    }

    /// The metric this task is ranked by.
    pub fn value(&self) -> f32 {
        match self.task {
            Task::Regression => self.rmse,
            Task::Classification => self.precision,
        }
    }
}

impl ModelScore for Score {
    /// Scores of different tasks are not comparable and never better.
    fn better_than(&self, other: &Self) -> bool {
        match (self.task, other.task) {
            (Task::Regression, Task::Regression) => self.rmse < other.rmse,
            (Task::Classification, Task::Classification) => self.precision > other.precision,
            _ => false,
        }
    }

    fn is_nan(&self) -> bool {
        self.value().is_nan()
    }
}

pub fn evaluate_regression<F>(test_set: &ClickDataSet, predict: F) -> Score
where
    F: Fn(&[usize]) -> f32,
{
    let mut sum = 0.0f32;
    for i in 0..test_set.count() {
        let (features, target) = test_set.get(i);
        let diff = predict(features) - target;
        sum += diff * diff;
    }
    let rmse = if test_set.count() == 0 {
        0.0
    } else {
        (sum / test_set.count() as f32).sqrt()
    };
    Score {
        task: Task::Regression,
        rmse,
        precision: 0.0,
    }
}

/// Precision over samples predicted positive; 0 when none are.
pub fn evaluate_classification<F>(test_set: &ClickDataSet, predict: F) -> Score
where
    F: Fn(&[usize]) -> f32,
{
    let (mut true_pos, mut false_pos) = (0usize, 0usize);
    for i in 0..test_set.count() {
        let (features, target) = test_set.get(i);
        if predict(features) > 0.0 {
            if target > 0.0 {
                true_pos += 1;
            } else {
                false_pos += 1;
            }
        }
    }
    let precision = if true_pos + false_pos == 0 {
        0.0
    } else {
        true_pos as f32 / (true_pos + false_pos) as f32
    };
    Score {
        task: Task::Classification,
        rmse: 0.0,
        precision,
    }
}
