// ============================================
// Candidate Generator
// ============================================
//
// MF path: every active item the user has not interacted with, scored by
// the model. Items the model has never seen are dropped here.
//
// Fallback path: see `popularity`.

pub mod popularity;

pub use popularity::{candidate_window, popular, popularity_score};

use crate::models::{Candidate, ItemId, ItemMetadata, UserId};
use crate::services::model::MfModel;
use crate::services::scorer::predict;
use std::collections::HashSet;

/// Scored candidate set with the counters needed for diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePool {
    pub total_active_items: usize,
    pub interacted_excluded_count: usize,
    pub candidates: Vec<Candidate>,
}

impl CandidatePool {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub struct CandidateGenerator;

impl CandidateGenerator {
    /// Score every eligible item for `user_id`.
    ///
    /// `items` is expected to be the active catalog; inactive rows are
    /// skipped anyway.
    pub fn score(
        model: &MfModel,
        user_id: UserId,
        items: &[ItemMetadata],
        interacted: &HashSet<ItemId>,
    ) -> CandidatePool {
        let active: Vec<&ItemMetadata> = items.iter().filter(|item| item.is_active).collect();
        let eligible: Vec<&ItemMetadata> = active
            .iter()
            .copied()
            .filter(|item| !interacted.contains(&item.item_id))
            .collect();

        let candidates = eligible
            .iter()
            .filter_map(|item| {
                predict(model, user_id, item.item_id)
                    .filter(|score| score.is_finite())
                    .map(|score| Candidate::from_item(item, score))
            })
            .collect();

        CandidatePool {
            total_active_items: active.len(),
            interacted_excluded_count: active.len() - eligible.len(),
            candidates,
        }
    }
}
