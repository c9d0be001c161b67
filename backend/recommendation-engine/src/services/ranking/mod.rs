//! Ranking Module
//!
//! Turns scored MF candidates into the final list.
//!
//! # Workflow
//! 1. Add the category affinity bonus to each model score
//! 2. Normalize (z-score or raw) for ordering only
//! 3. Sort by normalized score, then recency, then item id
//! 4. Blend the exploit slice with weighted exploration samples
//! 5. Rebalance toward the user's preferred categories
//! 6. Apply the hard per-category cap

pub mod affinity;

pub use affinity::CategoryAffinity;

use crate::config::{RankingConfig, ScoreNormalization};
use crate::models::Candidate;
use crate::services::diversity::{dedup_by_item, CategoryCap, SparsePreference};
use crate::services::exploration::Explorer;
use crate::utils::z_scores;
use std::cmp::Ordering;
use tracing::debug;

const ZSCORE_EPSILON: f64 = 1e-8;

/// Ranked output plus the counters surfaced in diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankOutcome {
    pub ranked: Vec<Candidate>,
    pub explore_count: usize,
    pub filled_by_backfill: usize,
}

/// Descending by normalized score, newest first on ties, then by item id
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.normalized_score
        .total_cmp(&a.normalized_score)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.item_id.cmp(&a.item_id))
}

pub struct Ranker {
    config: RankingConfig,
    explorer: Explorer,
    preference: SparsePreference,
    cap: CategoryCap,
}

impl Ranker {
    pub fn new(config: RankingConfig) -> Self {
        Self {
            explorer: Explorer::new(config.explore_ratio, config.seed),
            preference: SparsePreference::new(
                config.prefer_min_per_category,
                config.prefer_max_per_category,
            ),
            cap: CategoryCap::new(config.per_category_limit),
            config,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Add `affinity * category_bonus` to each raw score
    pub fn apply_category_bonus(&self, candidates: &mut [Candidate], affinity: &CategoryAffinity) {
        for candidate in candidates.iter_mut() {
            candidate.raw_score += affinity.weight(candidate.category_id) * self.config.category_bonus;
        }
    }

    /// Fill `normalized_score`; raw scores are left untouched
    pub fn normalize(&self, candidates: &mut [Candidate]) {
        match self.config.normalization {
            ScoreNormalization::ZScore => {
                let raw: Vec<f64> = candidates.iter().map(|c| c.raw_score).collect();
                for (candidate, z) in candidates.iter_mut().zip(z_scores(&raw, ZSCORE_EPSILON)) {
                    candidate.normalized_score = z;
                }
            }
            ScoreNormalization::None => {
                for candidate in candidates.iter_mut() {
                    candidate.normalized_score = candidate.raw_score;
                }
            }
        }
    }

    pub fn rank(
        &self,
        mut candidates: Vec<Candidate>,
        affinity: &CategoryAffinity,
        limit: usize,
    ) -> RankOutcome {
        if limit == 0 || candidates.is_empty() {
            return RankOutcome::default();
        }

        self.apply_category_bonus(&mut candidates, affinity);
        self.normalize(&mut candidates);
        candidates.sort_by(rank_order);

        let blend = self.explorer.blend(&candidates, limit);

        let mut merged = blend.merged;
        if !affinity.is_empty() {
            let preferred = affinity.preferred_categories();
            merged = self
                .preference
                .rebalance(&merged, &candidates, &preferred, limit);
        }

        debug!(
            scored = candidates.len(),
            normalization = self.config.normalization.as_str(),
            explore_count = blend.explore_count,
            merged = merged.len(),
            "Ranking blend complete"
        );

        if !self.config.diversify {
            merged.truncate(limit);
            return RankOutcome {
                ranked: merged,
                explore_count: blend.explore_count,
                filled_by_backfill: 0,
            };
        }

        // The cap walks the rebalanced list, then the rest of the ranking
        let mut sequence = merged;
        sequence.extend(candidates);
        let outcome = self.cap.apply(dedup_by_item(sequence), limit);

        RankOutcome {
            ranked: outcome.selected,
            explore_count: blend.explore_count,
            filled_by_backfill: outcome.filled_by_backfill,
        }
    }
}
