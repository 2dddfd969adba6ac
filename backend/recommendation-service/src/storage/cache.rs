use crate::error::Result;
use crate::models::ScoredItem;
use async_trait::async_trait;
use dashmap::DashMap;

/// Personalized list of a user, label = user id.
pub const RECOMMEND_ITEMS: &str = "recommend_items";
/// Neighbours of an item, label = item id.
pub const SIMILAR_ITEMS: &str = "similar_items";
pub const POPULAR_ITEMS: &str = "popular_items";
pub const LATEST_ITEMS: &str = "latest_items";

/// Scalar metadata written by the cache refresher.
pub const GLOBAL_META: &str = "global_meta";
pub const LAST_UPDATE_RECOMMEND_TIME: &str = "last_update_recommend_time";
pub const LAST_UPDATE_SIMILAR_TIME: &str = "last_update_similar_time";
pub const LAST_UPDATE_POPULAR_TIME: &str = "last_update_popular_time";
pub const LAST_UPDATE_LATEST_TIME: &str = "last_update_latest_time";

/// Scored lists, scalars and string lists keyed by `(prefix, name)`.
///
/// Absent keys read as empty values, never as errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Replaces the list stored under `(prefix, label)`.
    async fn set_scores(&self, prefix: &str, label: &str, items: &[ScoredItem]) -> Result<()>;

    /// Entries `begin..=end` of a list; `end == -1` reads to the end.
    async fn get_scores(
        &self,
        prefix: &str,
        label: &str,
        begin: usize,
        end: isize,
    ) -> Result<Vec<ScoredItem>>;

    async fn get_string(&self, prefix: &str, name: &str) -> Result<Option<String>>;
    async fn set_string(&self, prefix: &str, name: &str, value: &str) -> Result<()>;

    /// Absent integers read as 0.
    async fn get_int(&self, prefix: &str, name: &str) -> Result<i64>;
    async fn set_int(&self, prefix: &str, name: &str, value: i64) -> Result<()>;
    async fn incr_int(&self, prefix: &str, name: &str) -> Result<i64>;

    async fn append_list(&self, prefix: &str, name: &str, items: &[String]) -> Result<()>;
    async fn get_list(&self, prefix: &str, name: &str) -> Result<Vec<String>>;
    async fn clear_list(&self, prefix: &str, name: &str) -> Result<()>;
}

fn key(prefix: &str, name: &str) -> String {
    if name.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Process-local cache backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryCache {
    scores: DashMap<String, Vec<ScoredItem>>,
    strings: DashMap<String, String>,
    ints: DashMap<String, i64>,
    lists: DashMap<String, Vec<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set_scores(&self, prefix: &str, label: &str, items: &[ScoredItem]) -> Result<()> {
        self.scores.insert(key(prefix, label), items.to_vec());
        Ok(())
    }

    async fn get_scores(
        &self,
        prefix: &str,
        label: &str,
        begin: usize,
        end: isize,
    ) -> Result<Vec<ScoredItem>> {
        let Some(items) = self.scores.get(&key(prefix, label)) else {
            return Ok(Vec::new());
        };
        let stop = if end < 0 {
            items.len()
        } else {
            (end as usize).saturating_add(1).min(items.len())
        };
        if begin >= stop {
            return Ok(Vec::new());
        }
        Ok(items[begin..stop].to_vec())
    }

    async fn get_string(&self, prefix: &str, name: &str) -> Result<Option<String>> {
        Ok(self.strings.get(&key(prefix, name)).map(|v| v.clone()))
    }

    async fn set_string(&self, prefix: &str, name: &str, value: &str) -> Result<()> {
        self.strings.insert(key(prefix, name), value.to_string());
        Ok(())
    }

    async fn get_int(&self, prefix: &str, name: &str) -> Result<i64> {
        Ok(self.ints.get(&key(prefix, name)).map(|v| *v).unwrap_or(0))
    }

    async fn set_int(&self, prefix: &str, name: &str, value: i64) -> Result<()> {
        self.ints.insert(key(prefix, name), value);
        Ok(())
    }

    async fn incr_int(&self, prefix: &str, name: &str) -> Result<i64> {
        let mut entry = self.ints.entry(key(prefix, name)).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn append_list(&self, prefix: &str, name: &str, items: &[String]) -> Result<()> {
        self.lists
            .entry(key(prefix, name))
            .or_default()
            .extend_from_slice(items);
        Ok(())
    }

    async fn get_list(&self, prefix: &str, name: &str) -> Result<Vec<String>> {
        Ok(self
            .lists
            .get(&key(prefix, name))
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn clear_list(&self, prefix: &str, name: &str) -> Result<()> {
        self.lists.remove(&key(prefix, name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(ids: &[(&str, f32)]) -> Vec<ScoredItem> {
        ids.iter().map(|(id, s)| ScoredItem::new(*id, *s)).collect()
    }

    #[tokio::test]
    async fn test_scores_range() {
        let cache = MemoryCache::new();
        let items = scored(&[("1", 4.0), ("2", 3.0), ("3", 2.0), ("4", 1.0)]);
        cache.set_scores(RECOMMEND_ITEMS, "0", &items).await.unwrap();

        assert_eq!(cache.get_scores(RECOMMEND_ITEMS, "0", 0, -1).await.unwrap(), items);
        assert_eq!(cache.get_scores(RECOMMEND_ITEMS, "0", 1, 2).await.unwrap(), items[1..3]);
        assert_eq!(cache.get_scores(RECOMMEND_ITEMS, "0", 3, 100).await.unwrap(), items[3..]);
        assert!(cache.get_scores(RECOMMEND_ITEMS, "0", 9, -1).await.unwrap().is_empty());
        assert!(cache.get_scores(RECOMMEND_ITEMS, "1", 0, -1).await.unwrap().is_empty());

        // set replaces the previous list
        cache.set_scores(RECOMMEND_ITEMS, "0", &items[..1]).await.unwrap();
        assert_eq!(cache.get_scores(RECOMMEND_ITEMS, "0", 0, -1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scalars() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get_string(GLOBAL_META, LAST_UPDATE_POPULAR_TIME).await.unwrap(), None);
        cache.set_string(GLOBAL_META, LAST_UPDATE_POPULAR_TIME, "now").await.unwrap();
        assert_eq!(
            cache.get_string(GLOBAL_META, LAST_UPDATE_POPULAR_TIME).await.unwrap().as_deref(),
            Some("now")
        );

        assert_eq!(cache.get_int(GLOBAL_META, "n").await.unwrap(), 0);
        assert_eq!(cache.incr_int(GLOBAL_META, "n").await.unwrap(), 1);
        cache.set_int(GLOBAL_META, "n", 10).await.unwrap();
        assert_eq!(cache.incr_int(GLOBAL_META, "n").await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_lists() {
        let cache = MemoryCache::new();
        cache.append_list("ignore", "0", &["a".to_string()]).await.unwrap();
        cache.append_list("ignore", "0", &["b".to_string()]).await.unwrap();
        assert_eq!(cache.get_list("ignore", "0").await.unwrap(), vec!["a", "b"]);
        cache.clear_list("ignore", "0").await.unwrap();
        assert!(cache.get_list("ignore", "0").await.unwrap().is_empty());
    }
}
