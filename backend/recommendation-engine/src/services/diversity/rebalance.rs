use crate::models::{Candidate, CategoryId};
use std::collections::{HashMap, HashSet};

/// Sparse-preference rebalancing.
///
/// Makes sure the categories a user already engaged with show up in the
/// list even when the model ranks them low. `preferred` must already be
/// sorted by affinity, strongest first.
#[derive(Debug, Clone, Copy)]
pub struct SparsePreference {
    min_per_category: usize,
    max_per_category: usize,
}

impl SparsePreference {
    pub fn new(min_per_category: usize, max_per_category: usize) -> Self {
        Self {
            min_per_category,
            max_per_category: max_per_category.max(min_per_category),
        }
    }

    /// Number of preferred categories that can receive their minimum
    fn max_categories(&self, limit: usize) -> Option<usize> {
        (self.min_per_category > 0).then(|| (limit / self.min_per_category).max(1))
    }

    pub fn rebalance(
        &self,
        merged: &[Candidate],
        scored: &[Candidate],
        preferred: &[CategoryId],
        limit: usize,
    ) -> Vec<Candidate> {
        let mut categories = preferred.to_vec();
        if let Some(max) = self.max_categories(limit) {
            categories.truncate(max);
        }

        // Per-category queues: the merged list first, the full scored pool
        // only for categories the merged list has nothing for
        let mut queues: HashMap<CategoryId, Vec<&Candidate>> = HashMap::new();
        for &cid in &categories {
            let mut queue: Vec<&Candidate> =
                merged.iter().filter(|c| c.category_id == cid).collect();
            if queue.is_empty() {
                queue = scored.iter().filter(|c| c.category_id == cid).collect();
            }
            queues.insert(cid, queue);
        }

        let mut cursor: HashMap<CategoryId, usize> = HashMap::new();
        let mut per_category: HashMap<CategoryId, usize> = HashMap::new();
        let mut picked: Vec<Candidate> = Vec::with_capacity(limit);
        let mut picked_ids: HashSet<i64> = HashSet::new();

        let mut take_next = |cid: CategoryId| {
            let pos = cursor.entry(cid).or_insert(0);
            let next = queues.get(&cid).and_then(|queue| queue.get(*pos).copied());
            if next.is_some() {
                *pos += 1;
            }
            next
        };

        // Guarantee the minimum per category
        'minimum: for &cid in &categories {
            for _ in 0..self.min_per_category {
                if picked.len() >= limit {
                    break 'minimum;
                }
                let Some(candidate) = take_next(cid) else {
                    break;
                };
                if picked_ids.insert(candidate.item_id) {
                    picked.push(candidate.clone());
                    *per_category.entry(cid).or_insert(0) += 1;
                }
            }
        }

        // Round-robin up to the maximum per category
        while picked.len() < limit && self.max_per_category > 0 {
            let mut progressed = false;
            for &cid in &categories {
                if picked.len() >= limit {
                    break;
                }
                if per_category.get(&cid).copied().unwrap_or(0) >= self.max_per_category {
                    continue;
                }
                let Some(candidate) = take_next(cid) else {
                    continue;
                };
                progressed = true;
                if picked_ids.insert(candidate.item_id) {
                    picked.push(candidate.clone());
                    *per_category.entry(cid).or_insert(0) += 1;
                }
            }
            if !progressed {
                break;
            }
        }

        // Backfill in merged order
        for candidate in merged {
            if picked.len() >= limit {
                break;
            }
            if picked_ids.insert(candidate.item_id) {
                picked.push(candidate.clone());
            }
        }

        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::diversity::test_support::{candidate, ids};

    #[test]
    fn test_min_pick_pulls_from_scored_pool() {
        let scored = vec![
            candidate(1, 10, 5.0),
            candidate(2, 10, 4.0),
            candidate(3, 10, 3.0),
            candidate(4, 20, 2.0),
        ];
        let merged = scored[..3].to_vec();

        let picked = SparsePreference::new(1, 2).rebalance(&merged, &scored, &[20], 3);

        assert_eq!(ids(&picked), vec![4, 1, 2]);
    }

    #[test]
    fn test_round_robin_respects_max() {
        let merged = vec![
            candidate(1, 10, 6.0),
            candidate(2, 10, 5.0),
            candidate(3, 10, 4.0),
            candidate(4, 20, 3.0),
            candidate(5, 20, 2.0),
            candidate(6, 30, 1.0),
        ];

        let picked = SparsePreference::new(1, 2).rebalance(&merged, &merged, &[20, 10], 5);

        // min: 4, 1; round robin: 5, 2; backfill: 3
        assert_eq!(ids(&picked), vec![4, 1, 5, 2, 3]);
    }

    #[test]
    fn test_category_count_capped_by_limit() {
        let merged = vec![
            candidate(1, 10, 3.0),
            candidate(2, 20, 2.0),
            candidate(3, 30, 1.0),
        ];

        let picked = SparsePreference::new(2, 2).rebalance(&merged, &merged, &[30, 20, 10], 2);

        // limit / min = 1 category considered
        assert_eq!(ids(&picked), vec![3, 1]);
    }

    #[test]
    fn test_zero_minimum_only_fills_round_robin() {
        let merged = vec![candidate(1, 10, 2.0), candidate(2, 20, 1.0)];

        let picked = SparsePreference::new(0, 1).rebalance(&merged, &merged, &[20], 2);

        assert_eq!(ids(&picked), vec![2, 1]);
    }
}
