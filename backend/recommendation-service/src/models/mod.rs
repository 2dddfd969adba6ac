use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comment: String,
}

impl Item {
    pub fn new(item_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            item_id: item_id.into(),
            timestamp,
            labels: Vec::new(),
            comment: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub subscribe: Vec<String>,
    #[serde(default)]
    pub comment: String,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// Identifies one feedback record: a user can give several feedback types to the same item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeedbackKey {
    pub feedback_type: String,
    pub user_id: String,
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(flatten)]
    pub key: FeedbackKey,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
}

impl Feedback {
    pub fn new(
        feedback_type: impl Into<String>,
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            key: FeedbackKey {
                feedback_type: feedback_type.into(),
                user_id: user_id.into(),
                item_id: item_id.into(),
            },
            timestamp,
            comment: String::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.key.user_id
    }

    pub fn item_id(&self) -> &str {
        &self.key.item_id
    }

    pub fn feedback_type(&self) -> &str {
        &self.key.feedback_type
    }
}

/// Item with a ranking score, as stored in cached lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: String,
    pub score: f32,
}

impl ScoredItem {
    pub fn new(item_id: impl Into<String>, score: f32) -> Self {
        Self {
            item_id: item_id.into(),
            score,
        }
    }
}

/// Sorts by descending score; ties keep their input order.
pub fn sort_scored_items(items: &mut [ScoredItem]) {
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_feedback_json_is_flat() {
        let feedback = Feedback::new("click", "u1", "i1", Utc.timestamp_opt(0, 0).unwrap());
        let json = serde_json::to_value(&feedback).unwrap();
        assert_eq!(json["feedback_type"], "click");
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["item_id"], "i1");

        let decoded: Feedback = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, feedback);
    }

    #[test]
    fn test_sort_scored_items() {
        let mut items = vec![
            ScoredItem::new("a", 1.0),
            ScoredItem::new("b", 3.0),
            ScoredItem::new("c", 1.0),
            ScoredItem::new("d", 2.0),
        ];
        sort_scored_items(&mut items);
        let ids: Vec<_> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }
}
