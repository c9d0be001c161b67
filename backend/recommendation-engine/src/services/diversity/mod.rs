use crate::models::{Candidate, CategoryId};
use std::collections::{HashMap, HashSet};

mod rebalance;

pub use rebalance::SparsePreference;

/// Result of a capped selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapOutcome {
    pub selected: Vec<Candidate>,
    /// Items added after the capped pass, ignoring the cap
    pub filled_by_backfill: usize,
}

/// Diversity Layer - hard per-category cap
///
/// Walks the ranked sequence once keeping at most `per_category_limit`
/// items per category. If that leaves fewer than `limit` items, the same
/// sequence is walked again and skipped items are appended in rank order
/// until `limit` is reached. Both the popularity fallback and the MF path
/// go through this one policy.
#[derive(Debug, Clone, Copy)]
pub struct CategoryCap {
    per_category_limit: usize,
}

impl CategoryCap {
    pub fn new(per_category_limit: usize) -> Self {
        Self {
            per_category_limit: per_category_limit.max(1),
        }
    }

    pub fn apply(&self, ranked: Vec<Candidate>, limit: usize) -> CapOutcome {
        if limit == 0 || ranked.is_empty() {
            return CapOutcome::default();
        }

        let mut per_category: HashMap<CategoryId, usize> = HashMap::new();
        let mut taken = vec![false; ranked.len()];
        let mut kept = 0usize;

        for (idx, candidate) in ranked.iter().enumerate() {
            if kept >= limit {
                break;
            }
            let count = per_category.entry(candidate.category_id).or_insert(0);
            if *count >= self.per_category_limit {
                continue;
            }
            *count += 1;
            taken[idx] = true;
            kept += 1;
        }

        // Backfill keeps the rank order of the skipped items
        let mut backfill = Vec::new();
        for (idx, &was_taken) in taken.iter().enumerate() {
            if kept + backfill.len() >= limit {
                break;
            }
            if !was_taken {
                backfill.push(idx);
            }
        }

        let filled_by_backfill = backfill.len();
        let backfill: HashSet<usize> = backfill.into_iter().collect();

        let mut capped = Vec::with_capacity(kept);
        let mut extra = Vec::with_capacity(filled_by_backfill);
        for (idx, candidate) in ranked.into_iter().enumerate() {
            if taken[idx] {
                capped.push(candidate);
            } else if backfill.contains(&idx) {
                extra.push(candidate);
            }
        }
        capped.extend(extra);

        CapOutcome {
            selected: capped,
            filled_by_backfill,
        }
    }
}

/// Drop repeated item ids, keeping the first occurrence
pub(crate) fn dedup_by_item(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.item_id))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{Candidate, PopularityStats};
    use chrono::{TimeZone, Utc};

    pub fn candidate(item_id: i64, category_id: i64, score: f64) -> Candidate {
        Candidate {
            item_id,
            category_id,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            stats: PopularityStats::default(),
            raw_score: score,
            normalized_score: score,
        }
    }

    pub fn ids(candidates: &[Candidate]) -> Vec<i64> {
        candidates.iter().map(|c| c.item_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{candidate, ids};
    use super::*;

    #[test]
    fn test_cap_limits_each_category() {
        let ranked = vec![
            candidate(1, 10, 9.0),
            candidate(2, 10, 8.0),
            candidate(3, 10, 7.0),
            candidate(4, 20, 6.0),
            candidate(5, 10, 5.0),
            candidate(6, 30, 4.0),
        ];

        let outcome = CategoryCap::new(2).apply(ranked, 4);

        assert_eq!(ids(&outcome.selected), vec![1, 2, 4, 6]);
        assert_eq!(outcome.filled_by_backfill, 0);
    }

    #[test]
    fn test_backfill_appends_skipped_in_rank_order() {
        let ranked = vec![
            candidate(1, 10, 9.0),
            candidate(2, 10, 8.0),
            candidate(3, 10, 7.0),
            candidate(4, 20, 6.0),
            candidate(5, 10, 5.0),
        ];

        let outcome = CategoryCap::new(1).apply(ranked, 4);

        assert_eq!(ids(&outcome.selected), vec![1, 4, 2, 3]);
        assert_eq!(outcome.filled_by_backfill, 2);
    }

    #[test]
    fn test_short_catalog_returns_everything() {
        let ranked = vec![candidate(1, 10, 1.0), candidate(2, 10, 0.5)];
        let outcome = CategoryCap::new(3).apply(ranked, 10);
        assert_eq!(ids(&outcome.selected), vec![1, 2]);
    }

    #[test]
    fn test_zero_limit_is_empty() {
        let outcome = CategoryCap::new(3).apply(vec![candidate(1, 1, 1.0)], 0);
        assert!(outcome.selected.is_empty());
    }

    #[test]
    fn test_dedup_keeps_first() {
        let deduped = dedup_by_item(vec![
            candidate(1, 1, 1.0),
            candidate(2, 1, 0.5),
            candidate(1, 1, 0.1),
        ]);
        assert_eq!(ids(&deduped), vec![1, 2]);
    }
}
