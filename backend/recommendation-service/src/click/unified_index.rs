//! One numbering space for users, items and item labels.
//!
//! Layout is `[users | items | labels]`, so a feature vector is a plain list
//! of positions into a single weight table.

use crate::base::MapIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedIndex {
    users: MapIndex,
    items: MapIndex,
    labels: MapIndex,
}

impl UnifiedIndex {
    pub fn len(&self) -> usize {
        self.users.len() + self.items.len() + self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_users(&self) -> usize {
        self.users.len()
    }

    pub fn count_items(&self) -> usize {
        self.items.len()
    }

    pub fn count_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn encode_user(&self, user_id: &str) -> Option<usize> {
        self.users.to_number(user_id)
    }

    pub fn encode_item(&self, item_id: &str) -> Option<usize> {
        self.items
            .to_number(item_id)
            .map(|i| i + self.users.len())
    }

    pub fn encode_label(&self, label: &str) -> Option<usize> {
        self.labels
            .to_number(label)
            .map(|i| i + self.users.len() + self.items.len())
    }

    pub fn get_users(&self) -> &[String] {
        self.users.names()
    }

    pub fn get_items(&self) -> &[String] {
        self.items.names()
    }

    pub fn get_labels(&self) -> &[String] {
        self.labels.names()
    }
}

/// Collects names; offsets are fixed only once every name is known.
#[derive(Debug, Default)]
pub struct UnifiedIndexBuilder {
    index: UnifiedIndex,
}

impl UnifiedIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, user_id: &str) {
        self.index.users.add(user_id);
    }

    pub fn add_item(&mut self, item_id: &str) {
        self.index.items.add(item_id);
    }

    pub fn add_label(&mut self, label: &str) {
        self.index.labels.add(label);
    }

    pub fn build(self) -> UnifiedIndex {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_index() {
        let mut builder = UnifiedIndexBuilder::new();
        for user in ["u1", "u2", "u3"] {
            builder.add_user(user);
        }
        for item in ["i1", "i2"] {
            builder.add_item(item);
        }
        builder.add_label("red");
        builder.add_user("u1");
        let index = builder.build();

        assert_eq!(index.len(), 6);
        assert_eq!(index.encode_user("u2"), Some(1));
        assert_eq!(index.encode_item("i1"), Some(3));
        assert_eq!(index.encode_item("i2"), Some(4));
        assert_eq!(index.encode_label("red"), Some(5));
        assert_eq!(index.encode_user("i1"), None);
        assert_eq!(index.encode_label("blue"), None);
        assert_eq!(index.get_items(), ["i1", "i2"]);
    }
}
