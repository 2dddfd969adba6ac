use super::loader::{load_feedback, load_items};
use crate::config::RecommendConfig;
use crate::error::Result;
use crate::models::{sort_scored_items, ScoredItem};
use crate::ranking::{DataSet, Knn, RankingModel};
use crate::storage::cache::{
    GLOBAL_META, LAST_UPDATE_LATEST_TIME, LAST_UPDATE_POPULAR_TIME, LAST_UPDATE_RECOMMEND_TIME,
    LAST_UPDATE_SIMILAR_TIME, LATEST_ITEMS, POPULAR_ITEMS, RECOMMEND_ITEMS, SIMILAR_ITEMS,
};
use crate::storage::{CacheStore, DataStore};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Writes the lists [`super::Recommender`] reads.
pub struct CacheRefresher {
    cache: Arc<dyn CacheStore>,
    data: Arc<dyn DataStore>,
    config: RecommendConfig,
}

impl CacheRefresher {
    pub fn new(cache: Arc<dyn CacheStore>, data: Arc<dyn DataStore>, config: RecommendConfig) -> Self {
        Self { cache, data, config }
    }

    async fn touch(&self, name: &str) -> Result<()> {
        self.cache
            .set_string(GLOBAL_META, name, &Utc::now().to_rfc3339())
            .await
    }

    /// Top items per training user, excluding the user's training items.
    /// Returns the number of lists written.
    pub async fn refresh_recommend(&self, model: &RankingModel, train_set: &DataSet) -> Result<usize> {
        let start = Instant::now();
        let item_ids = model.item_ids();
        for user in 0..train_set.user_count() {
            let user_id = train_set.user_index().to_name(user)?;
            let seen: HashSet<String> = train_set
                .user_feedback(user)
                .iter()
                .map(|&item| train_set.item_index().to_name(item))
                .collect::<Result<_>>()?;
            let mut scored: Vec<ScoredItem> = item_ids
                .iter()
                .filter(|item_id| !seen.contains(*item_id))
                .map(|item_id| ScoredItem::new(item_id.as_str(), model.predict(&user_id, item_id)))
                .collect();
            sort_scored_items(&mut scored);
            scored.truncate(self.config.cache_size);
            self.cache.set_scores(RECOMMEND_ITEMS, &user_id, &scored).await?;
        }
        self.touch(LAST_UPDATE_RECOMMEND_TIME).await?;
        info!(
            model = model.name(),
            n_users = train_set.user_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "refreshed personalized lists"
        );
        Ok(train_set.user_count())
    }

    /// Nearest neighbours of every item known to the model.
    pub async fn refresh_similar(&self, knn: &Knn) -> Result<usize> {
        let Some(hood) = knn.neighbourhood() else {
            return Ok(0);
        };
        let item_ids = hood.item_index.get_names();
        for item_id in &item_ids {
            let similar = knn.similar_items(item_id, self.config.cache_size)?;
            self.cache.set_scores(SIMILAR_ITEMS, item_id, &similar).await?;
        }
        self.touch(LAST_UPDATE_SIMILAR_TIME).await?;
        info!(n_items = item_ids.len(), "refreshed similar items");
        Ok(item_ids.len())
    }

    /// Items ranked by the number of positive feedback records.
    pub async fn refresh_popular(&self) -> Result<()> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in load_feedback(self.data.as_ref(), &self.config.positive_feedback_types).await? {
            *counts.entry(record.key.item_id).or_insert(0) += 1;
        }
        let mut popular: Vec<ScoredItem> = counts
            .into_iter()
            .map(|(item_id, count)| ScoredItem::new(item_id, count as f32))
            .collect();
        popular.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.item_id.cmp(&b.item_id)));
        popular.truncate(self.config.cache_size);
        self.cache.set_scores(POPULAR_ITEMS, "", &popular).await?;
        self.touch(LAST_UPDATE_POPULAR_TIME).await
    }

    /// Items ranked by timestamp, newest first; score is the unix time.
    pub async fn refresh_latest(&self) -> Result<()> {
        let mut items = load_items(self.data.as_ref()).await?;
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.item_id.cmp(&b.item_id)));
        let latest: Vec<ScoredItem> = items
            .into_iter()
            .take(self.config.cache_size)
            .map(|item| ScoredItem::new(item.item_id, item.timestamp.timestamp() as f32))
            .collect();
        self.cache.set_scores(LATEST_ITEMS, "", &latest).await?;
        self.touch(LAST_UPDATE_LATEST_TIME).await
    }
}
