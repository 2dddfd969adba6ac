use super::ModelScore;

/// Keeps the best evaluated checkpoint seen during one `fit` call.
///
/// Weights are only copied when a checkpoint beats the retained one, so the
/// caller passes a closure producing the deep copy instead of the copy itself.
#[derive(Debug)]
pub struct SnapshotManager<S, W> {
    best: Option<(S, W)>,
}

impl<S: ModelScore, W> Default for SnapshotManager<S, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ModelScore, W> SnapshotManager<S, W> {
    pub fn new() -> Self {
        Self { best: None }
    }

    /// Returns true when the checkpoint replaced the retained best.
    pub fn add_snapshot<F>(&mut self, score: S, weights: F) -> bool
    where
        F: FnOnce() -> W,
    {
        let better = match &self.best {
            None => true,
            Some((best, _)) => score.better_than(best),
        };
        if better {
            self.best = Some((score, weights()));
        }
        better
    }

    pub fn best_score(&self) -> Option<&S> {
        self.best.as_ref().map(|(score, _)| score)
    }

    pub fn into_best(self) -> Option<(S, W)> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ndcg(f32);

    impl ModelScore for Ndcg {
        fn better_than(&self, other: &Self) -> bool {
            self.0 > other.0
        }

        fn is_nan(&self) -> bool {
            self.0.is_nan()
        }
    }

    #[test]
    fn test_keeps_strictly_better() {
        let mut snapshots = SnapshotManager::new();
        assert!(snapshots.add_snapshot(Ndcg(0.1), || vec![1]));
        assert!(snapshots.add_snapshot(Ndcg(0.3), || vec![2]));
        assert!(!snapshots.add_snapshot(Ndcg(0.3), || vec![3]));
        assert!(!snapshots.add_snapshot(Ndcg(0.2), || vec![4]));

        let (score, weights) = snapshots.into_best().unwrap();
        assert_eq!(score, Ndcg(0.3));
        assert_eq!(weights, vec![2]);
    }

    #[test]
    fn test_best_is_monotone() {
        let mut snapshots = SnapshotManager::new();
        let mut previous: Option<Ndcg> = None;
        for value in [0.2, 0.1, 0.5, 0.4, 0.6, 0.0] {
            snapshots.add_snapshot(Ndcg(value), || ());
            let best = snapshots.best_score().cloned().unwrap();
            if let Some(previous) = previous {
                assert!(!previous.better_than(&best));
            }
            previous = Some(best);
        }
        assert_eq!(previous, Some(Ndcg(0.6)));
    }

    #[test]
    fn test_copy_is_lazy() {
        let mut snapshots = SnapshotManager::new();
        snapshots.add_snapshot(Ndcg(0.5), || 1);
        snapshots.add_snapshot(Ndcg(0.1), || panic!("worse checkpoint must not be copied"));
        assert_eq!(snapshots.best_score(), Some(&Ndcg(0.5)));
    }
}
