use super::dataset::DataSet;
use crate::base::{parallel, RandomGenerator};
use crate::error::{AppError, Result};
use crate::model::ModelScore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Top-K ranking quality averaged over validation users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub ndcg: f32,
    pub precision: f32,
    pub recall: f32,
}

impl ModelScore for Score {
    fn better_than(&self, other: &Self) -> bool {
        self.ndcg > other.ndcg
    }

    fn is_nan(&self) -> bool {
        self.ndcg.is_nan()
    }
}

/// Binary-relevance NDCG with a log2 discount.
pub fn ndcg(targets: &HashSet<usize>, ranked: &[usize]) -> f32 {
    let dcg: f32 = ranked
        .iter()
        .enumerate()
        .filter(|(_, item)| targets.contains(item))
        .map(|(i, _)| 1.0 / ((i + 2) as f32).log2())
        .sum();
    let ideal: f32 = (0..targets.len().min(ranked.len()))
        .map(|i| 1.0 / ((i + 2) as f32).log2())
        .sum();
    if ideal == 0.0 {
        0.0
    } else {
        dcg / ideal
    }
}

pub fn precision(targets: &HashSet<usize>, ranked: &[usize]) -> f32 {
    if ranked.is_empty() {
        return 0.0;
    }
    let hits = ranked.iter().filter(|item| targets.contains(item)).count();
    hits as f32 / ranked.len() as f32
}

pub fn recall(targets: &HashSet<usize>, ranked: &[usize]) -> f32 {
    if targets.is_empty() {
        return 0.0;
    }
    let hits = ranked.iter().filter(|item| targets.contains(item)).count();
    hits as f32 / targets.len() as f32
}

/// Scores `predict(user, item)` over dense indices of `train_set`.
///
/// For every test user with held-out items the candidate list is the
/// held-out positives plus up to `n_candidates` sampled items the user has
/// not interacted with; a positive tied with a sampled item ranks below it.
/// Users missing from the train index are skipped. Sampling is seeded per
/// user so a fixed model always gets the same score regardless of worker
/// scheduling.
pub fn evaluate<F>(
    test_set: &DataSet,
    train_set: &DataSet,
    top_k: usize,
    n_candidates: usize,
    n_jobs: usize,
    predict: F,
) -> Result<Score>
where
    F: Fn(usize, usize) -> f32 + Sync,
{
    let n_workers = n_jobs.max(1);
    // [ndcg, precision, recall, users]
    let partials: Vec<Mutex<[f64; 4]>> = (0..n_workers).map(|_| Mutex::new([0.0; 4])).collect();

    parallel::<_, AppError>(test_set.user_count(), n_workers, |worker_id, test_user| {
        let held_out = test_set.user_feedback(test_user);
        if held_out.is_empty() {
            return Ok(());
        }
        let user_id = test_set.user_index().to_name(test_user)?;
        let Some(user) = train_set.user_index().to_number(&user_id) else {
            return Ok(());
        };
        let mut targets = HashSet::with_capacity(held_out.len());
        for &item in held_out {
            let item_id = test_set.item_index().to_name(item)?;
            if let Some(item) = train_set.item_index().to_number(&item_id) {
                targets.insert(item);
            }
        }
        if targets.is_empty() {
            return Ok(());
        }
        let seen: HashSet<usize> = train_set.user_feedback(user).iter().copied().collect();

        // negatives precede targets so a tie never ranks a target higher
        let mut rng = RandomGenerator::new(test_user as u64);
        let mut candidates = rng.sample_excluding(train_set.item_count(), n_candidates, |item| {
            seen.contains(&item) || targets.contains(&item)
        });
        let mut positives: Vec<usize> = targets.iter().copied().collect();
        positives.sort_unstable();
        candidates.extend(positives);

        let mut scored: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|item| (item, predict(user, item)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let ranked: Vec<usize> = scored.into_iter().take(top_k).map(|(item, _)| item).collect();

        let mut sums = partials[worker_id].lock();
        sums[0] += ndcg(&targets, &ranked) as f64;
        sums[1] += precision(&targets, &ranked) as f64;
        sums[2] += recall(&targets, &ranked) as f64;
        sums[3] += 1.0;
        Ok(())
    })?;

    let mut total = [0.0f64; 4];
    for partial in partials {
        let partial = partial.into_inner();
        for (t, p) in total.iter_mut().zip(partial) {
            *t += p;
        }
    }
    if total[3] == 0.0 {
        return Ok(Score::default());
    }
    Ok(Score {
        ndcg: (total[0] / total[3]) as f32,
        precision: (total[1] / total[3]) as f32,
        recall: (total[2] / total[3]) as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::dataset::DataSetBuilder;

    fn set(items: &[usize]) -> HashSet<usize> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_ndcg() {
        let targets = set(&[1, 3]);
        assert!((ndcg(&targets, &[1, 3, 5]) - 1.0).abs() < 1e-6);

        // hits at ranks 2 and 3
        let expected = (1.0 / 3f32.log2() + 0.5) / (1.0 + 1.0 / 3f32.log2());
        assert!((ndcg(&targets, &[5, 1, 3]) - expected).abs() < 1e-6);
        assert_eq!(ndcg(&targets, &[5, 6]), 0.0);
        assert_eq!(ndcg(&HashSet::new(), &[1]), 0.0);
    }

    #[test]
    fn test_precision_recall() {
        let targets = set(&[1, 2, 3, 4]);
        assert_eq!(precision(&targets, &[1, 9]), 0.5);
        assert_eq!(recall(&targets, &[1, 9]), 0.25);
        assert_eq!(precision(&targets, &[]), 0.0);
        assert_eq!(recall(&HashSet::new(), &[1]), 0.0);
    }

    fn split_sets() -> (DataSet, DataSet) {
        let mut train = DataSetBuilder::new();
        let mut test_pairs = Vec::new();
        for user in 0..20 {
            for item in 0..20 {
                let (u, i) = (format!("u{}", user), format!("i{}", item));
                if item == user {
                    test_pairs.push((u.clone(), i.clone()));
                }
                train.add_user(&u).unwrap();
                train.add_item(&i).unwrap();
                if (item + user) % 3 == 0 && item != user {
                    train.add_feedback(&u, &i).unwrap();
                }
            }
        }
        let train = train.build();
        let mut test =
            DataSetBuilder::with_indices(train.user_index().clone(), train.item_index().clone());
        for (u, i) in test_pairs {
            test.add_feedback(&u, &i).unwrap();
        }
        (train, test.build())
    }

    #[test]
    fn test_evaluate_oracle() {
        let (train, test) = split_sets();
        // the held-out item of user u is item u
        let score = evaluate(&test, &train, 10, 50, 4, |u, i| if u == i { 1.0 } else { 0.0 }).unwrap();
        assert!((score.ndcg - 1.0).abs() < 1e-6);
        assert!((score.recall - 1.0).abs() < 1e-6);
        assert!((score.precision - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_constant_predictor_gains_nothing_from_ties() {
        let (train, test) = split_sets();
        let score = evaluate(&test, &train, 5, 10, 2, |_, _| 0.0).unwrap();
        assert_eq!(score.ndcg, 0.0);
        assert_eq!(score.precision, 0.0);
        assert_eq!(score.recall, 0.0);
    }

    #[test]
    fn test_evaluate_skips_users_unknown_to_train() {
        let (train, _) = split_sets();
        let mut test = DataSetBuilder::new();
        test.add_feedback("stranger", "i0").unwrap();
        let score = evaluate(&test.build(), &train, 10, 50, 1, |_, _| 1.0).unwrap();
        assert_eq!(score, Score::default());
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let (train, test) = split_sets();
        let predict = |u: usize, i: usize| ((u * 31 + i * 17) % 13) as f32;
        let a = evaluate(&test, &train, 5, 10, 1, predict).unwrap();
        let b = evaluate(&test, &train, 5, 10, 4, predict).unwrap();
        assert!((a.ndcg - b.ndcg).abs() < 1e-6);
        assert!((a.precision - b.precision).abs() < 1e-6);
        assert!((a.recall - b.recall).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_empty() {
        let train = DataSetBuilder::new().build();
        let test = DataSetBuilder::new().build();
        let score = evaluate(&test, &train, 10, 100, 2, |_, _| 0.0).unwrap();
        assert_eq!(score, Score::default());
    }
}
