use super::unified_index::{UnifiedIndex, UnifiedIndexBuilder};
use crate::base::RandomGenerator;

/// Labelled samples for factorization machines.
///
/// Each sample is `[user, item, labels...]` in unified-index positions plus a
/// target. Both halves of a [`ClickDataSet::split`] share the index.
#[derive(Debug, Clone, Default)]
pub struct ClickDataSet {
    index: UnifiedIndex,
    features: Vec<Vec<usize>>,
    target: Vec<f32>,
}

impl ClickDataSet {
    pub fn index(&self) -> &UnifiedIndex {
        &self.index
    }

    pub fn count(&self) -> usize {
        self.target.len()
    }

    pub fn get(&self, i: usize) -> (&[usize], f32) {
        (&self.features[i], self.target[i])
    }

    pub fn targets(&self) -> &[f32] {
        &self.target
    }

    /// Moves a random `test_ratio` share of samples into the second set.
    pub fn split(&self, test_ratio: f32, seed: u64) -> (ClickDataSet, ClickDataSet) {
        let mut rng = RandomGenerator::new(seed);
        let mut order: Vec<usize> = (0..self.count()).collect();
        for i in (1..order.len()).rev() {
            let j = rng.intn(i + 1);
            order.swap(i, j);
        }
        let n_test = ((self.count() as f32) * test_ratio).round() as usize;
        let (test, train) = order.split_at(n_test.min(order.len()));
        (self.subset(train), self.subset(test))
    }

    fn subset(&self, rows: &[usize]) -> ClickDataSet {
        let mut rows = rows.to_vec();
        rows.sort_unstable();
        ClickDataSet {
            index: self.index.clone(),
            features: rows.iter().map(|&i| self.features[i].clone()).collect(),
            target: rows.iter().map(|&i| self.target[i]).collect(),
        }
    }
}

struct RawSample {
    user_id: String,
    item_id: String,
    labels: Vec<String>,
    target: f32,
}

#[derive(Default)]
pub struct ClickDataSetBuilder {
    index: UnifiedIndexBuilder,
    samples: Vec<RawSample>,
}

impl ClickDataSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, user_id: &str) {
        self.index.add_user(user_id);
    }

    pub fn add_item(&mut self, item_id: &str, labels: &[String]) {
        self.index.add_item(item_id);
        for label in labels {
            self.index.add_label(label);
        }
    }

    pub fn add_sample(&mut self, user_id: &str, item_id: &str, labels: &[String], target: f32) {
        self.add_user(user_id);
        self.add_item(item_id, labels);
        self.samples.push(RawSample {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            labels: labels.to_vec(),
            target,
        });
    }

    pub fn build(self) -> ClickDataSet {
        let index = self.index.build();
        let mut features = Vec::with_capacity(self.samples.len());
        let mut target = Vec::with_capacity(self.samples.len());
        for sample in self.samples {
            let mut x = Vec::with_capacity(2 + sample.labels.len());
            // every name of a sample was registered by add_sample
            x.extend(index.encode_user(&sample.user_id));
            x.extend(index.encode_item(&sample.item_id));
            x.extend(sample.labels.iter().filter_map(|l| index.encode_label(l)));
            features.push(x);
            target.push(sample.target);
        }
        ClickDataSet {
            index,
            features,
            target,
        }
    }
}
