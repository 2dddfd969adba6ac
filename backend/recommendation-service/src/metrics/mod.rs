//! Prometheus collectors for training jobs and recommendation requests.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::time::Duration;

/// Recommendation requests by outcome (ok/error).
pub static RECOMMEND_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommend_requests_total",
        "Recommendation requests segmented by outcome",
        &["status"]
    )
    .expect("Failed to register recommend_requests_total")
});

/// Items served per resolution stage.
pub static RECOMMEND_ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommend_items_total",
        "Recommended items segmented by resolution stage",
        &["stage"]
    )
    .expect("Failed to register recommend_items_total")
});

pub static TRAINING_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "training_duration_seconds",
        "Model fit duration segmented by model family",
        &["model"],
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]
    )
    .expect("Failed to register training_duration_seconds")
});

/// Rows left unchanged because their normal equations were singular.
pub static TRAINING_SINGULAR_ROWS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "training_singular_rows_total",
        "Factor rows skipped on singular systems",
        &["model"]
    )
    .expect("Failed to register training_singular_rows_total")
});

pub static TRAINING_DIVERGED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "training_diverged_total",
        "Fits stopped early on a non-finite loss",
        &["model"]
    )
    .expect("Failed to register training_diverged_total")
});

pub fn observe_training_duration(model: &str, elapsed: Duration) {
    TRAINING_DURATION_SECONDS
        .with_label_values(&[model])
        .observe(elapsed.as_secs_f64());
}

pub fn record_singular_rows(model: &str, rows: u64) {
    TRAINING_SINGULAR_ROWS_TOTAL
        .with_label_values(&[model])
        .inc_by(rows);
}

pub fn record_diverged(model: &str) {
    TRAINING_DIVERGED_TOTAL.with_label_values(&[model]).inc();
}

pub fn record_recommend_request(status: &str) {
    RECOMMEND_REQUESTS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_recommend_items(stage: &str, n: usize) {
    RECOMMEND_ITEMS_TOTAL
        .with_label_values(&[stage])
        .inc_by(n as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let before = RECOMMEND_ITEMS_TOTAL.with_label_values(&["unit-test"]).get();
        record_recommend_items("unit-test", 3);
        record_recommend_items("unit-test", 2);
        assert_eq!(
            RECOMMEND_ITEMS_TOTAL.with_label_values(&["unit-test"]).get(),
            before + 5
        );

        record_singular_rows("unit-test", 4);
        assert!(TRAINING_SINGULAR_ROWS_TOTAL.with_label_values(&["unit-test"]).get() >= 4);
    }
}
