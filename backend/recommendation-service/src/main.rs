use anyhow::{Context, Result};
use recommendation_service::click::{self, Fm, Task};
use recommendation_service::model::{Estimator, ParamName, Params};
use recommendation_service::models::Feedback;
use recommendation_service::ranking::ModelSearcher;
use recommendation_service::services::loader::{load_click_dataset, load_ranking_dataset};
use recommendation_service::storage::{DataStore, MemoryDataStore};
use recommendation_service::Config;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Parses one feedback record per non-empty line.
fn parse_feedback(raw: &str) -> Result<Vec<Feedback>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid feedback on line {}", n + 1))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("Failed to load config")?;
    info!(
        service = %config.service.service_name,
        feedback_path = %config.training.feedback_path,
        "starting training job"
    );

    let raw = tokio::fs::read_to_string(&config.training.feedback_path)
        .await
        .with_context(|| format!("Failed to read {}", config.training.feedback_path))?;
    let data = Arc::new(MemoryDataStore::new());
    let stored = data
        .batch_insert_feedback(parse_feedback(&raw)?, true, true)
        .await
        .context("Failed to store feedback")?;
    info!(stored, "loaded feedback");

    let dataset = load_ranking_dataset(data.as_ref(), &config.recommend.positive_feedback_types).await?;
    let (train, validate) = dataset.split(config.training.test_ratio, config.training.split_seed);

    let searcher = ModelSearcher::new(
        config.training.n_epochs,
        config.training.n_trials,
        config.training.n_jobs,
    );
    searcher.fit(&train, &validate)?;
    let Some(best) = searcher.best_model() else {
        warn!("no ranking model could be trained");
        return Ok(());
    };
    tokio::fs::write(&config.training.model_output_path, best.model.encode()?)
        .await
        .with_context(|| format!("Failed to write {}", config.training.model_output_path))?;
    info!(
        model = best.name,
        path = %config.training.model_output_path,
        similarity = %searcher.best_similarity(),
        "saved ranking model"
    );

    let clicks = load_click_dataset(data.as_ref(), &config.recommend.positive_feedback_types).await?;
    if clicks.count() == 0 {
        warn!("no click samples, skip factorization machine");
        return Ok(());
    }
    let (click_train, click_test) = clicks.split(config.training.test_ratio, config.training.split_seed);
    let mut fm = Fm::new(
        Task::Classification,
        Params::new().with(ParamName::NEpochs, config.training.n_epochs),
    );
    let score = fm.fit(
        &click_train,
        &click_test,
        &click::FitConfig::default().with_jobs(config.training.n_jobs),
    )?;
    tokio::fs::write(&config.training.click_model_output_path, fm.encode()?)
        .await
        .with_context(|| format!("Failed to write {}", config.training.click_model_output_path))?;
    info!(
        precision = score.precision,
        path = %config.training.click_model_output_path,
        "saved click model"
    );
    Ok(())
}
