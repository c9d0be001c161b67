use crate::models::{Candidate, ItemMetadata};
use crate::services::diversity::{CapOutcome, CategoryCap};
use crate::services::ranking::rank_order;

pub const ORDER_COUNT_WEIGHT: f64 = 0.8;
pub const REVIEW_COUNT_WEIGHT: f64 = 0.15;

const MIN_WINDOW: usize = 50;
const MAX_WINDOW: usize = 500;

/// `order_count * 0.8 + avg_rating + review_count * 0.15`
pub fn popularity_score(item: &ItemMetadata) -> f64 {
    item.order_count as f64 * ORDER_COUNT_WEIGHT
        + item.avg_rating
        + item.review_count as f64 * REVIEW_COUNT_WEIGHT
}

/// How many top items the category cap may look at
pub fn candidate_window(limit: usize) -> usize {
    limit.saturating_mul(5).clamp(MIN_WINDOW, MAX_WINDOW)
}

/// Popularity fallback.
///
/// Active items only; no per-user exclusion. Deterministic for a given
/// catalog: ties fall back to recency, then item id.
pub fn popular(items: &[ItemMetadata], limit: usize, cap: &CategoryCap) -> CapOutcome {
    let mut ranked: Vec<Candidate> = items
        .iter()
        .filter(|item| item.is_active)
        .map(|item| Candidate::from_item(item, popularity_score(item)))
        .collect();
    ranked.sort_by(rank_order);
    ranked.truncate(candidate_window(limit));

    cap.apply(ranked, limit)
}
