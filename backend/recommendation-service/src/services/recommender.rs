use crate::config::RecommendConfig;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{Feedback, ScoredItem};
use crate::storage::cache::{LATEST_ITEMS, POPULAR_ITEMS, RECOMMEND_ITEMS, SIMILAR_ITEMS};
use crate::storage::{CacheStore, DataStore};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Non-personalized list used when the earlier stages run short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Popular,
    Latest,
    None,
}

impl Fallback {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "popular" => Ok(Fallback::Popular),
            "latest" => Ok(Fallback::Latest),
            "none" => Ok(Fallback::None),
            other => Err(AppError::Configuration(format!(
                "unknown fallback recommendation: {:?}",
                other
            ))),
        }
    }

    fn cache_prefix(&self) -> Option<&'static str> {
        match self {
            Fallback::Popular => Some(POPULAR_ITEMS),
            Fallback::Latest => Some(LATEST_ITEMS),
            Fallback::None => None,
        }
    }
}

/// Accumulates one response across stages: no duplicates, consumed items
/// skipped, capped at `n`.
struct Collector<'a> {
    n: usize,
    consumed: &'a HashSet<String>,
    seen: HashSet<String>,
    items: Vec<String>,
}

impl<'a> Collector<'a> {
    fn new(n: usize, consumed: &'a HashSet<String>) -> Self {
        Self {
            n,
            consumed,
            seen: HashSet::new(),
            items: Vec::with_capacity(n),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.n
    }

    fn extend(&mut self, stage: &str, candidates: Vec<ScoredItem>) {
        let before = self.items.len();
        for candidate in candidates {
            if self.is_full() {
                break;
            }
            if self.consumed.contains(&candidate.item_id) || self.seen.contains(&candidate.item_id) {
                continue;
            }
            self.seen.insert(candidate.item_id.clone());
            self.items.push(candidate.item_id);
        }
        let added = self.items.len() - before;
        if added > 0 {
            metrics::record_recommend_items(stage, added);
        }
    }
}

/// Serves recommendations from cached lists.
pub struct Recommender {
    cache: Arc<dyn CacheStore>,
    data: Arc<dyn DataStore>,
    config: RecommendConfig,
}

impl Recommender {
    pub fn new(cache: Arc<dyn CacheStore>, data: Arc<dyn DataStore>, config: RecommendConfig) -> Self {
        Self { cache, data, config }
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    /// Up to `n` items for a user, writing them back when a write-back type
    /// is configured.
    pub async fn recommend(&self, user_id: &str, n: usize) -> Result<Vec<String>> {
        let write_back = self.config.write_back_type.clone();
        self.recommend_with(user_id, n, write_back.as_deref()).await
    }

    pub async fn recommend_with(
        &self,
        user_id: &str,
        n: usize,
        write_back: Option<&str>,
    ) -> Result<Vec<String>> {
        let result = self.resolve(user_id, n, write_back).await;
        match &result {
            Ok(_) => metrics::record_recommend_request("ok"),
            Err(e) => {
                warn!(user_id, error = %e, "recommendation failed");
                metrics::record_recommend_request("error");
            }
        }
        result
    }

    async fn resolve(&self, user_id: &str, n: usize, write_back: Option<&str>) -> Result<Vec<String>> {
        let fallback = Fallback::parse(&self.config.fallback_recommend)?;
        let consumed: HashSet<String> = self
            .data
            .get_user_feedback(user_id, &[])
            .await?
            .into_iter()
            .map(|f| f.key.item_id)
            .collect();
        let mut collector = Collector::new(n, &consumed);

        let personalized = self.cache.get_scores(RECOMMEND_ITEMS, user_id, 0, -1).await?;
        collector.extend("personalized", personalized);

        if !collector.is_full() {
            let similar = self.similar_to_recent(user_id).await?;
            collector.extend("similar", similar);
        }

        if !collector.is_full() {
            if let Some(prefix) = fallback.cache_prefix() {
                let items = self.cache.get_scores(prefix, "", 0, -1).await?;
                collector.extend(prefix, items);
            }
        }

        let items = collector.items;
        if let Some(feedback_type) = write_back {
            let now = Utc::now();
            for item_id in &items {
                self.data
                    .insert_feedback(Feedback::new(feedback_type, user_id, item_id.as_str(), now), true, true)
                    .await?;
            }
        }
        debug!(user_id, n, returned = items.len(), "resolved recommendation");
        Ok(items)
    }

    /// Neighbours of the user's most recent positive items, scores summed
    /// across seeds.
    async fn similar_to_recent(&self, user_id: &str) -> Result<Vec<ScoredItem>> {
        let mut seeds = self
            .data
            .get_user_feedback(user_id, &self.config.positive_feedback_types)
            .await?;
        seeds.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        seeds.truncate(self.config.num_feedback_fallback_item_based);

        let mut scores: HashMap<String, f32> = HashMap::new();
        for seed in &seeds {
            let neighbours = self.cache.get_scores(SIMILAR_ITEMS, seed.item_id(), 0, -1).await?;
            for neighbour in neighbours {
                *scores.entry(neighbour.item_id).or_insert(0.0) += neighbour.score;
            }
        }
        let mut candidates: Vec<ScoredItem> = scores
            .into_iter()
            .map(|(item_id, score)| ScoredItem::new(item_id, score))
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.item_id.cmp(&b.item_id)));
        Ok(candidates)
    }
}
