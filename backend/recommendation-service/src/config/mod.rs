use crate::error::{AppError, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub training: TrainingConfig,
    pub recommend: RecommendConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// JSON lines file of feedback records.
    pub feedback_path: String,
    pub model_output_path: String,
    pub click_model_output_path: String,
    pub n_epochs: usize,
    pub n_trials: usize,
    pub n_jobs: usize,
    pub test_ratio: f32,
    pub split_seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendConfig {
    /// `popular`, `latest` or `none`; checked on every request.
    pub fallback_recommend: String,
    /// Served items are stored as feedback of this type when set.
    pub write_back_type: Option<String>,
    pub num_feedback_fallback_item_based: usize,
    /// Feedback types seeding similar-item expansion; empty means all.
    pub positive_feedback_types: Vec<String>,
    /// Length of cached personalized and similar-item lists.
    pub cache_size: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            fallback_recommend: "latest".to_string(),
            write_back_type: None,
            num_feedback_fallback_item_based: 10,
            positive_feedback_types: Vec::new(),
            cache_size: 100,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|e| AppError::Configuration(format!("{} must be valid ({}): {}", key, raw, e)))
}

fn parse_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            service: ServiceConfig {
                service_name: lookup("SERVICE_NAME")
                    .unwrap_or_else(|| "recommendation-service".to_string()),
            },
            training: TrainingConfig {
                feedback_path: lookup("FEEDBACK_PATH")
                    .unwrap_or_else(|| "feedback.jsonl".to_string()),
                model_output_path: lookup("MODEL_OUTPUT_PATH")
                    .unwrap_or_else(|| "ranking_model.bin".to_string()),
                click_model_output_path: lookup("CLICK_MODEL_OUTPUT_PATH")
                    .unwrap_or_else(|| "click_model.bin".to_string()),
                n_epochs: parse_var(&lookup, "TRAINING_N_EPOCHS", "100")?,
                n_trials: parse_var(&lookup, "TRAINING_N_TRIALS", "10")?,
                n_jobs: parse_var(&lookup, "TRAINING_N_JOBS", "1")?,
                test_ratio: parse_var(&lookup, "TRAINING_TEST_RATIO", "0.2")?,
                split_seed: parse_var(&lookup, "TRAINING_SPLIT_SEED", "0")?,
            },
            recommend: RecommendConfig {
                fallback_recommend: lookup("FALLBACK_RECOMMEND")
                    .unwrap_or_else(|| "latest".to_string()),
                write_back_type: lookup("WRITE_BACK_TYPE").filter(|t| !t.is_empty()),
                num_feedback_fallback_item_based: parse_var(
                    &lookup,
                    "NUM_FEEDBACK_FALLBACK_ITEM_BASED",
                    "10",
                )?,
                positive_feedback_types: parse_list(lookup("POSITIVE_FEEDBACK_TYPES")),
                cache_size: parse_var(&lookup, "CACHE_SIZE", "100")?,
            },
        })
    }
}
