//! End-to-end flow over in-memory stores: load, train, persist, refresh, serve.

use chrono::{TimeZone, Utc};
use recommendation_service::config::RecommendConfig;
use recommendation_service::model::{Estimator, ModelScore, ParamName, Params};
use recommendation_service::models::{Feedback, Item};
use recommendation_service::ranking::{DataSet, FitConfig, RankingModel};
use recommendation_service::services::loader::load_ranking_dataset;
use recommendation_service::storage::{CacheStore, DataStore, MemoryCache, MemoryDataStore};
use recommendation_service::{CacheRefresher, Recommender};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

/// Three communities of ten users, each liking most of its own four items.
async fn seeded_store() -> MemoryDataStore {
    let data = MemoryDataStore::new();
    let mut feedback = Vec::new();
    for user in 0..30 {
        for item in 0..12 {
            if item % 3 == user % 3 && (item + user) % 5 != 0 {
                let ts = Utc.timestamp_opt(user * 100 + item, 0).unwrap();
                feedback.push(Feedback::new("like", format!("u{}", user), format!("i{}", item), ts));
            }
        }
    }
    let items = (0..12)
        .map(|i| Item::new(format!("i{}", i), Utc.timestamp_opt(i, 0).unwrap()))
        .collect();
    data.batch_insert_items(items).await.unwrap();
    data.batch_insert_feedback(feedback, true, false).await.unwrap();
    data
}

fn fit(name: &str, n_epochs: usize, train: &DataSet, test: &DataSet) -> (RankingModel, f32) {
    let params = Params::new()
        .with(ParamName::NEpochs, n_epochs)
        .with(ParamName::NFactors, 8);
    let mut model = RankingModel::new(name, params).unwrap();
    let score = model
        .fit(train, test, &FitConfig::default().with_jobs(2))
        .unwrap();
    assert!(!score.is_nan());
    (model, score.ndcg)
}

#[tokio::test]
async fn test_training_never_worse_than_initial() {
    let data = seeded_store().await;
    let dataset = load_ranking_dataset(&data, &[]).await.unwrap();
    let (train, test) = dataset.split(0.3, 1);

    for name in ["bpr", "als", "ccd"] {
        let (_, initial) = fit(name, 0, &train, &test);
        let (_, trained) = fit(name, 10, &train, &test);
        assert!(
            trained + 1e-6 >= initial,
            "{} regressed: {} < {}",
            name,
            trained,
            initial
        );
    }
}

#[tokio::test]
async fn test_model_file_round_trip() {
    let data = seeded_store().await;
    let dataset = load_ranking_dataset(&data, &[]).await.unwrap();
    let (train, test) = dataset.split(0.3, 1);
    let (model, _) = fit("bpr", 3, &train, &test);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&model.encode().unwrap()).unwrap();
    let restored = RankingModel::decode(&std::fs::read(file.path()).unwrap()).unwrap();

    assert_eq!(restored.name(), "bpr");
    assert_eq!(restored.item_ids(), model.item_ids());
    for user in ["u0", "u7", "u29"] {
        for item in model.item_ids() {
            assert_eq!(restored.predict(user, &item), model.predict(user, &item));
        }
    }
}

#[tokio::test]
async fn test_refresh_then_recommend() {
    let data = Arc::new(seeded_store().await);
    let cache = Arc::new(MemoryCache::new());
    let dataset = load_ranking_dataset(data.as_ref(), &[]).await.unwrap();
    let (model, _) = fit("knn", 1, &dataset, &dataset);

    let config = RecommendConfig {
        fallback_recommend: "popular".to_string(),
        cache_size: 5,
        ..RecommendConfig::default()
    };
    let refresher = CacheRefresher::new(cache.clone(), data.clone(), config.clone());
    refresher.refresh_recommend(&model, &dataset).await.unwrap();
    if let RankingModel::Knn(knn) = &model {
        refresher.refresh_similar(knn).await.unwrap();
    }
    refresher.refresh_popular().await.unwrap();
    refresher.refresh_latest().await.unwrap();

    let recommender = Recommender::new(cache.clone(), data.clone(), config);
    let consumed: HashSet<String> = data
        .get_user_feedback("u4", &[])
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.key.item_id)
        .collect();

    let items = recommender.recommend_with("u4", 4, Some("read")).await.unwrap();
    assert_eq!(items.len(), 4);
    assert!(items.iter().all(|item| !consumed.contains(item)));
    assert_eq!(items.iter().collect::<HashSet<_>>().len(), items.len());

    // served items are now consumed
    let next = recommender.recommend("u4", 4).await.unwrap();
    assert!(next.iter().all(|item| !items.contains(item)));

    let popular = cache.get_scores("popular_items", "", 0, -1).await.unwrap();
    assert_eq!(popular.len(), 5);
}
