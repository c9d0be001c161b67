//! Offline Evaluation
//!
//! Aggregate quality signals over a batch of recommendation lists:
//! catalog coverage, concentration on the most-served items, overlap
//! between users and spread of scores inside each list.

use crate::models::{ItemId, Recommendation, UserId};
use crate::utils::std_dev;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Random user pairs drawn for the overlap estimate
const JACCARD_SAMPLES: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub users_evaluated: usize,
    pub total_rows: usize,
    pub unique_items_covered: usize,
    pub top10_share: f64,
    pub top20_share: f64,
    pub top50_share: f64,
    pub avg_jaccard_across_users: f64,
    pub avg_score_std_per_user: f64,
}

/// Collects per-user lists, then reduces them to `EvaluationMetrics`
#[derive(Debug, Default)]
pub struct EvaluationAccumulator {
    item_counts: HashMap<ItemId, usize>,
    user_items: BTreeMap<UserId, HashSet<ItemId>>,
    user_scores: BTreeMap<UserId, Vec<f64>>,
    total_rows: usize,
}

impl EvaluationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty lists are ignored
    pub fn record(&mut self, user_id: UserId, rows: &[Recommendation]) {
        if rows.is_empty() {
            return;
        }
        let items = self.user_items.entry(user_id).or_default();
        for row in rows {
            self.total_rows += 1;
            *self.item_counts.entry(row.item_id).or_insert(0) += 1;
            items.insert(row.item_id);
            if let Some(score) = row.score {
                self.user_scores.entry(user_id).or_default().push(score);
            }
        }
    }

    pub fn finish(&self, seed: u64) -> EvaluationMetrics {
        EvaluationMetrics {
            users_evaluated: self.user_items.len(),
            total_rows: self.total_rows,
            unique_items_covered: self.item_counts.len(),
            top10_share: self.top_share(10),
            top20_share: self.top_share(20),
            top50_share: self.top_share(50),
            avg_jaccard_across_users: self.avg_jaccard(seed),
            avg_score_std_per_user: self.avg_score_std(),
        }
    }

    /// Fraction of all served rows taken by the `k` most-served items
    fn top_share(&self, k: usize) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        let mut counts: Vec<usize> = self.item_counts.values().copied().collect();
        counts.sort_unstable_by(|a, b| b.cmp(a));
        let top: usize = counts.iter().take(k).sum();
        top as f64 / self.total_rows as f64
    }

    fn avg_jaccard(&self, seed: u64) -> f64 {
        let users: Vec<&HashSet<ItemId>> = self.user_items.values().collect();
        if users.len() < 2 {
            return 0.0;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut values = Vec::with_capacity(JACCARD_SAMPLES);
        for _ in 0..JACCARD_SAMPLES {
            let pair: Vec<&&HashSet<ItemId>> = users.choose_multiple(&mut rng, 2).collect();
            let (a, b) = (*pair[0], *pair[1]);
            let union = a.union(b).count();
            if union == 0 {
                continue;
            }
            values.push(a.intersection(b).count() as f64 / union as f64);
        }

        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// Users with fewer than two scored rows do not contribute
    fn avg_score_std(&self) -> f64 {
        let stds: Vec<f64> = self
            .user_scores
            .values()
            .filter(|scores| scores.len() >= 2)
            .map(|scores| std_dev(scores))
            .collect();
        if stds.is_empty() {
            0.0
        } else {
            stds.iter().sum::<f64>() / stds.len() as f64
        }
    }
}
