use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ItemId = i64;
pub type CategoryId = i64;

/// Which collaborator stream an interaction came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RatingSource {
    Review,
    Wishlist,
    Order,
}

/// A single weighted signal, produced while aggregating and never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct RatingEvent {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub weight: f64,
    pub source: RatingSource,
}

/// Aggregated (user, item, value) triple fed to the trainer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub value: f64,
}

impl Rating {
    pub fn new(user_id: UserId, item_id: ItemId, value: f64) -> Self {
        Self {
            user_id,
            item_id,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub user_id: UserId,
    pub item_id: ItemId,
    /// Star rating in 1..=5
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEvent {
    pub user_id: UserId,
    pub item_id: ItemId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineEvent {
    pub user_id: UserId,
    pub item_id: ItemId,
}

/// Catalog row with the aggregate stats the collaborator maintains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub item_id: ItemId,
    pub category_id: CategoryId,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub avg_rating: f64,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub order_count: u32,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PopularityStats {
    pub order_count: u32,
    pub review_count: u32,
    pub avg_rating: f64,
}

/// Per-request scoring unit
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub item_id: ItemId,
    pub category_id: CategoryId,
    pub created_at: DateTime<Utc>,
    pub stats: PopularityStats,
    /// Popularity score on the fallback path, model score plus category bonus otherwise
    pub raw_score: f64,
    /// Ordering key only; never returned to callers
    pub normalized_score: f64,
}

impl Candidate {
    pub fn from_item(item: &ItemMetadata, raw_score: f64) -> Self {
        Self {
            item_id: item.item_id,
            category_id: item.category_id,
            created_at: item.created_at,
            stats: PopularityStats {
                order_count: item.order_count,
                review_count: item.review_count,
                avg_rating: item.avg_rating,
            },
            raw_score,
            normalized_score: raw_score,
        }
    }

    pub fn into_recommendation(self, with_score: bool) -> Recommendation {
        Recommendation {
            item_id: self.item_id,
            category_id: self.category_id,
            avg_rating: self.stats.avg_rating,
            review_count: self.stats.review_count,
            score: with_score.then_some(self.raw_score),
        }
    }
}

/// Outbound row; `score` is `None` for popularity fallback results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: ItemId,
    pub category_id: CategoryId,
    pub avg_rating: f64,
    pub review_count: u32,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    AnonymousUser,
    ModelUnavailable,
    UnknownUser,
    NoActiveItems,
    NoScorableItems,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::AnonymousUser => "anonymous_user",
            FallbackReason::ModelUnavailable => "model_unavailable",
            FallbackReason::UnknownUser => "unknown_user",
            FallbackReason::NoActiveItems => "no_active_items",
            FallbackReason::NoScorableItems => "no_scorable_items",
        }
    }
}

/// Per-request counters surfaced by the diagnostics entry point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub total_active_items: usize,
    pub interacted_excluded_count: usize,
    pub scorable_items: usize,
    pub explore_count: usize,
    pub selected_after_diversify: usize,
    pub filled_by_backfill: usize,
    pub fallback_reason: Option<FallbackReason>,
}

/// One row of the per-user category report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category_id: CategoryId,
    pub review_count: u32,
    pub avg_rating: f64,
    pub wishlist_count: u32,
    pub order_count: u32,
    pub recommend_count: u32,
}
