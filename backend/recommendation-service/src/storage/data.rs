use crate::error::{AppError, Result};
use crate::models::{Feedback, FeedbackKey, Item, User};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Users, items and feedback.
///
/// Listing is cursor paginated: pass `""` to start and the returned cursor to
/// continue; an empty returned cursor means the listing is complete. An empty
/// `feedback_types` slice matches every type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn insert_user(&self, user: User) -> Result<()>;
    async fn batch_insert_users(&self, users: Vec<User>) -> Result<()>;
    async fn get_user(&self, user_id: &str) -> Result<User>;
    /// Removes the user and the user's feedback.
    async fn delete_user(&self, user_id: &str) -> Result<()>;
    async fn get_users(&self, cursor: &str, n: usize) -> Result<(String, Vec<User>)>;

    async fn insert_item(&self, item: Item) -> Result<()>;
    async fn batch_insert_items(&self, items: Vec<Item>) -> Result<()>;
    async fn get_item(&self, item_id: &str) -> Result<Item>;
    /// Removes the item and feedback on it.
    async fn delete_item(&self, item_id: &str) -> Result<()>;
    async fn get_items(&self, cursor: &str, n: usize) -> Result<(String, Vec<Item>)>;

    /// Feedback on a missing user or item is dropped unless the matching
    /// `insert_*` flag asks to create it.
    async fn insert_feedback(
        &self,
        feedback: Feedback,
        insert_user: bool,
        insert_item: bool,
    ) -> Result<()>;
    /// Returns the number of stored records.
    async fn batch_insert_feedback(
        &self,
        feedback: Vec<Feedback>,
        insert_user: bool,
        insert_item: bool,
    ) -> Result<usize>;
    async fn get_feedback(
        &self,
        cursor: &str,
        n: usize,
        feedback_types: &[String],
    ) -> Result<(String, Vec<Feedback>)>;
    async fn get_user_feedback(&self, user_id: &str, feedback_types: &[String]) -> Result<Vec<Feedback>>;
    async fn get_item_feedback(&self, item_id: &str, feedback_types: &[String]) -> Result<Vec<Feedback>>;
    async fn get_user_item_feedback(
        &self,
        user_id: &str,
        item_id: &str,
        feedback_types: &[String],
    ) -> Result<Vec<Feedback>>;
    /// Returns the number of deleted records.
    async fn delete_user_item_feedback(
        &self,
        user_id: &str,
        item_id: &str,
        feedback_types: &[String],
    ) -> Result<usize>;
}

fn type_matches(feedback_types: &[String], feedback_type: &str) -> bool {
    feedback_types.is_empty() || feedback_types.iter().any(|t| t == feedback_type)
}

/// Up to `n` entries after `cursor` and the cursor of the next page.
fn page<K, V, C>(map: &BTreeMap<K, V>, after: Option<K>, n: usize, cursor_of: C) -> (String, Vec<V>)
where
    K: Ord,
    V: Clone,
    C: Fn(&K) -> String,
{
    let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
    let mut range = map.range((lower, Bound::Unbounded));
    let values: Vec<(&K, &V)> = range.by_ref().take(n).collect();
    let next = match (values.last(), range.next()) {
        (Some((last, _)), Some(_)) => cursor_of(last),
        _ => String::new(),
    };
    (next, values.into_iter().map(|(_, v)| v.clone()).collect())
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<String, User>,
    items: BTreeMap<String, Item>,
    feedback: BTreeMap<FeedbackKey, Feedback>,
}

impl Tables {
    /// Returns whether the record was stored.
    fn insert_feedback(&mut self, feedback: Feedback, insert_user: bool, insert_item: bool) -> bool {
        if !self.users.contains_key(feedback.user_id()) {
            if !insert_user {
                return false;
            }
            self.users
                .insert(feedback.user_id().to_string(), User::new(feedback.user_id()));
        }
        if !self.items.contains_key(feedback.item_id()) {
            if !insert_item {
                return false;
            }
            self.items.insert(
                feedback.item_id().to_string(),
                Item::new(feedback.item_id(), feedback.timestamp),
            );
        }
        self.feedback.insert(feedback.key.clone(), feedback);
        true
    }
}

/// Process-local data store over ordered maps.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    tables: RwLock<Tables>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter_feedback<P>(&self, feedback_types: &[String], predicate: P) -> Vec<Feedback>
    where
        P: Fn(&FeedbackKey) -> bool,
    {
        self.tables
            .read()
            .feedback
            .values()
            .filter(|f| type_matches(feedback_types, f.feedback_type()) && predicate(&f.key))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn insert_user(&self, user: User) -> Result<()> {
        self.tables.write().users.insert(user.user_id.clone(), user);
        Ok(())
    }

    async fn batch_insert_users(&self, users: Vec<User>) -> Result<()> {
        let mut tables = self.tables.write();
        for user in users {
            tables.users.insert(user.user_id.clone(), user);
        }
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        self.tables
            .read()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        let mut tables = self.tables.write();
        tables.users.remove(user_id);
        tables.feedback.retain(|key, _| key.user_id != user_id);
        Ok(())
    }

    async fn get_users(&self, cursor: &str, n: usize) -> Result<(String, Vec<User>)> {
        let after = (!cursor.is_empty()).then(|| cursor.to_string());
        Ok(page(&self.tables.read().users, after, n, String::clone))
    }

    async fn insert_item(&self, item: Item) -> Result<()> {
        self.tables.write().items.insert(item.item_id.clone(), item);
        Ok(())
    }

    async fn batch_insert_items(&self, items: Vec<Item>) -> Result<()> {
        let mut tables = self.tables.write();
        for item in items {
            tables.items.insert(item.item_id.clone(), item);
        }
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> Result<Item> {
        self.tables
            .read()
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("item {}", item_id)))
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        let mut tables = self.tables.write();
        tables.items.remove(item_id);
        tables.feedback.retain(|key, _| key.item_id != item_id);
        Ok(())
    }

    async fn get_items(&self, cursor: &str, n: usize) -> Result<(String, Vec<Item>)> {
        let after = (!cursor.is_empty()).then(|| cursor.to_string());
        Ok(page(&self.tables.read().items, after, n, String::clone))
    }

    async fn insert_feedback(
        &self,
        feedback: Feedback,
        insert_user: bool,
        insert_item: bool,
    ) -> Result<()> {
        self.tables
            .write()
            .insert_feedback(feedback, insert_user, insert_item);
        Ok(())
    }

    async fn batch_insert_feedback(
        &self,
        feedback: Vec<Feedback>,
        insert_user: bool,
        insert_item: bool,
    ) -> Result<usize> {
        let mut tables = self.tables.write();
        Ok(feedback
            .into_iter()
            .filter(|f| !f.user_id().is_empty() && !f.item_id().is_empty())
            .map(|f| tables.insert_feedback(f, insert_user, insert_item))
            .filter(|stored| *stored)
            .count())
    }

    async fn get_feedback(
        &self,
        cursor: &str,
        n: usize,
        feedback_types: &[String],
    ) -> Result<(String, Vec<Feedback>)> {
        let after: Option<FeedbackKey> = if cursor.is_empty() {
            None
        } else {
            Some(serde_json::from_str(cursor)?)
        };
        let tables = self.tables.read();
        let matching: BTreeMap<&FeedbackKey, &Feedback> = tables
            .feedback
            .iter()
            .filter(|(key, _)| type_matches(feedback_types, &key.feedback_type))
            .collect();
        let (next, values) = page(&matching, after.as_ref(), n, |key| {
            serde_json::to_string(key).unwrap_or_default()
        });
        Ok((next, values.into_iter().cloned().collect()))
    }

    async fn get_user_feedback(&self, user_id: &str, feedback_types: &[String]) -> Result<Vec<Feedback>> {
        Ok(self.filter_feedback(feedback_types, |key| key.user_id == user_id))
    }

    async fn get_item_feedback(&self, item_id: &str, feedback_types: &[String]) -> Result<Vec<Feedback>> {
        Ok(self.filter_feedback(feedback_types, |key| key.item_id == item_id))
    }

    async fn get_user_item_feedback(
        &self,
        user_id: &str,
        item_id: &str,
        feedback_types: &[String],
    ) -> Result<Vec<Feedback>> {
        Ok(self.filter_feedback(feedback_types, |key| {
            key.user_id == user_id && key.item_id == item_id
        }))
    }

    async fn delete_user_item_feedback(
        &self,
        user_id: &str,
        item_id: &str,
        feedback_types: &[String],
    ) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.feedback.len();
        tables.feedback.retain(|key, _| {
            !(key.user_id == user_id
                && key.item_id == item_id
                && type_matches(feedback_types, &key.feedback_type))
        });
        Ok(before - tables.feedback.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn feedback(feedback_type: &str, user: &str, item: &str, ts: i64) -> Feedback {
        Feedback::new(feedback_type, user, item, Utc.timestamp_opt(ts, 0).unwrap())
    }

    #[tokio::test]
    async fn test_users_pagination() {
        let store = MemoryDataStore::new();
        store
            .batch_insert_users((0..5).map(|i| User::new(format!("u{}", i))).collect())
            .await
            .unwrap();

        let mut cursor = String::new();
        let mut seen = Vec::new();
        loop {
            let (next, users) = store.get_users(&cursor, 2).await.unwrap();
            seen.extend(users.into_iter().map(|u| u.user_id));
            if next.is_empty() {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen, vec!["u0", "u1", "u2", "u3", "u4"]);
    }

    #[tokio::test]
    async fn test_feedback_insert_flags() {
        let store = MemoryDataStore::new();
        let stored = store
            .batch_insert_feedback(vec![feedback("click", "u1", "i1", 0)], false, true)
            .await
            .unwrap();
        assert_eq!(stored, 0);
        assert!(store.get_item("i1").await.is_err());

        let stored = store
            .batch_insert_feedback(
                vec![feedback("click", "u1", "i1", 0), feedback("like", "u1", "i1", 1)],
                true,
                true,
            )
            .await
            .unwrap();
        assert_eq!(stored, 2);
        assert_eq!(store.get_user("u1").await.unwrap().user_id, "u1");
        assert!(matches!(store.get_user("u9").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_feedback_filters() {
        let store = MemoryDataStore::new();
        store
            .batch_insert_feedback(
                vec![
                    feedback("click", "u1", "i1", 0),
                    feedback("like", "u1", "i1", 1),
                    feedback("click", "u1", "i2", 2),
                    feedback("click", "u2", "i2", 3),
                ],
                true,
                true,
            )
            .await
            .unwrap();
        let like = vec!["like".to_string()];

        assert_eq!(store.get_user_feedback("u1", &[]).await.unwrap().len(), 3);
        assert_eq!(store.get_user_feedback("u1", &like).await.unwrap().len(), 1);
        assert_eq!(store.get_item_feedback("i2", &[]).await.unwrap().len(), 2);
        assert_eq!(store.get_user_item_feedback("u1", "i1", &[]).await.unwrap().len(), 2);

        let (_, page_one) = store.get_feedback("", 10, &like).await.unwrap();
        assert_eq!(page_one.len(), 1);

        assert_eq!(store.delete_user_item_feedback("u1", "i1", &like).await.unwrap(), 1);
        assert_eq!(store.get_user_item_feedback("u1", "i1", &[]).await.unwrap().len(), 1);

        store.delete_item("i2").await.unwrap();
        assert!(store.get_item_feedback("i2", &[]).await.unwrap().is_empty());
        store.delete_user("u1").await.unwrap();
        assert!(store.get_user_feedback("u1", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_pagination() {
        let store = MemoryDataStore::new();
        let records: Vec<Feedback> = (0..7)
            .map(|i| feedback("click", &format!("u{}", i % 3), &format!("i{}", i), i))
            .collect();
        store.batch_insert_feedback(records, true, true).await.unwrap();

        let mut cursor = String::new();
        let mut total = 0;
        loop {
            let (next, page) = store.get_feedback(&cursor, 3, &[]).await.unwrap();
            total += page.len();
            if next.is_empty() {
                break;
            }
            cursor = next;
        }
        assert_eq!(total, 7);
    }
}
