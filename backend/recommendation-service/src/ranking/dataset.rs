use crate::base::{Index, RandomGenerator};
use crate::error::Result;
use std::collections::HashSet;

/// Implicit feedback as adjacency lists over dense user and item indices.
///
/// Built once through [`DataSetBuilder`] and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    user_index: Index,
    item_index: Index,
    feedback_users: Vec<usize>,
    feedback_items: Vec<usize>,
    user_feedback: Vec<Vec<usize>>,
    item_feedback: Vec<Vec<usize>>,
}

impl DataSet {
    pub fn user_index(&self) -> &Index {
        &self.user_index
    }

    pub fn item_index(&self) -> &Index {
        &self.item_index
    }

    /// Number of (user, item) pairs.
    pub fn count(&self) -> usize {
        self.feedback_users.len()
    }

    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }

    pub fn item_count(&self) -> usize {
        self.item_index.len()
    }

    /// Items of a user in insertion order.
    pub fn user_feedback(&self, user: usize) -> &[usize] {
        self.user_feedback.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn item_feedback(&self, item: usize) -> &[usize] {
        self.item_feedback.get(item).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The `i`-th pair as `(user, item)`.
    pub fn get(&self, i: usize) -> (usize, usize) {
        (self.feedback_users[i], self.feedback_items[i])
    }

    /// Holds out one random item for a random `test_ratio` share of users with
    /// at least two items. Both halves keep this dataset's indices.
    pub fn split(&self, test_ratio: f32, seed: u64) -> (DataSet, DataSet) {
        let mut rng = RandomGenerator::new(seed);
        let mut eligible: Vec<usize> = (0..self.user_count())
            .filter(|&u| self.user_feedback(u).len() >= 2)
            .collect();
        let n_test = ((eligible.len() as f32) * test_ratio.clamp(0.0, 1.0)).round() as usize;
        // partial Fisher-Yates
        for i in 0..n_test.min(eligible.len()) {
            let j = i + rng.intn(eligible.len() - i);
            eligible.swap(i, j);
        }
        let mut held_out: HashSet<(usize, usize)> = HashSet::new();
        for &user in eligible.iter().take(n_test) {
            let items = self.user_feedback(user);
            held_out.insert((user, items[rng.intn(items.len())]));
        }

        let mut train = DataSetBuilder::with_indices(self.user_index.clone(), self.item_index.clone());
        let mut test = DataSetBuilder::with_indices(self.user_index.clone(), self.item_index.clone());
        for i in 0..self.count() {
            let (user, item) = self.get(i);
            if held_out.contains(&(user, item)) {
                test.push_pair(user, item);
            } else {
                train.push_pair(user, item);
            }
        }
        (train.build(), test.build())
    }
}

/// Grows the indices and collects pairs, dropping duplicates.
#[derive(Debug, Default)]
pub struct DataSetBuilder {
    user_index: Index,
    item_index: Index,
    pairs: Vec<(usize, usize)>,
    seen: HashSet<(usize, usize)>,
}

impl DataSetBuilder {
    pub fn new() -> Self {
        Self::with_indices(Index::map(), Index::map())
    }

    pub fn with_indices(user_index: Index, item_index: Index) -> Self {
        Self {
            user_index,
            item_index,
            pairs: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn add_user(&mut self, user_id: &str) -> Result<()> {
        self.user_index.add(user_id)
    }

    pub fn add_item(&mut self, item_id: &str) -> Result<()> {
        self.item_index.add(item_id)
    }

    /// Registers both ids if needed and records the pair.
    pub fn add_feedback(&mut self, user_id: &str, item_id: &str) -> Result<()> {
        self.user_index.add(user_id)?;
        self.item_index.add(item_id)?;
        if let (Some(user), Some(item)) = (
            self.user_index.to_number(user_id),
            self.item_index.to_number(item_id),
        ) {
            self.push_pair(user, item);
        }
        Ok(())
    }

    fn push_pair(&mut self, user: usize, item: usize) {
        if self.seen.insert((user, item)) {
            self.pairs.push((user, item));
        }
    }

    pub fn build(self) -> DataSet {
        let mut user_feedback = vec![Vec::new(); self.user_index.len()];
        let mut item_feedback = vec![Vec::new(); self.item_index.len()];
        let mut feedback_users = Vec::with_capacity(self.pairs.len());
        let mut feedback_items = Vec::with_capacity(self.pairs.len());
        for (user, item) in self.pairs {
            user_feedback[user].push(item);
            item_feedback[item].push(user);
            feedback_users.push(user);
            feedback_items.push(item);
        }
        DataSet {
            user_index: self.user_index,
            item_index: self.item_index,
            feedback_users,
            feedback_items,
            user_feedback,
            item_feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataSet {
        let mut builder = DataSetBuilder::new();
        for user in 0..10 {
            for item in 0..=user {
                builder
                    .add_feedback(&format!("u{}", user), &format!("i{}", item))
                    .unwrap();
            }
        }
        builder.build()
    }

    #[test]
    fn test_build() {
        let mut builder = DataSetBuilder::new();
        builder.add_feedback("u1", "a").unwrap();
        builder.add_feedback("u1", "b").unwrap();
        builder.add_feedback("u2", "b").unwrap();
        builder.add_feedback("u1", "a").unwrap();
        builder.add_item("c").unwrap();
        let data = builder.build();

        assert_eq!(data.count(), 3);
        assert_eq!(data.user_count(), 2);
        assert_eq!(data.item_count(), 3);
        assert_eq!(data.user_feedback(0), &[0, 1]);
        assert_eq!(data.item_feedback(1), &[0, 1]);
        assert!(data.item_feedback(2).is_empty());
        assert!(data.user_feedback(99).is_empty());
        assert_eq!(data.get(2), (1, 1));
    }

    #[test]
    fn test_split() {
        let data = sample();
        let (train, test) = data.split(0.5, 1);

        assert_eq!(train.count() + test.count(), data.count());
        assert_eq!(test.count(), 5);
        assert_eq!(train.user_index(), data.user_index());
        assert_eq!(test.item_index(), data.item_index());
        for user in 0..test.user_count() {
            assert!(test.user_feedback(user).len() <= 1);
            for item in test.user_feedback(user) {
                assert!(!train.user_feedback(user).contains(item));
            }
            // every user keeps at least one training item
            assert!(!train.user_feedback(user).is_empty());
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let data = sample();
        let (_, a) = data.split(0.3, 7);
        let (_, b) = data.split(0.3, 7);
        let pairs = |d: &DataSet| (0..d.count()).map(|i| d.get(i)).collect::<Vec<_>>();
        assert_eq!(pairs(&a), pairs(&b));
    }
}
