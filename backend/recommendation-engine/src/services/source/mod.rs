// ============================================
// Interaction Source (collaborator read interface)
// ============================================
//
// The engine never owns orders, wishlists or reviews. It reads them
// through this trait and hands back ranked item lists.

mod memory;

pub use memory::{InMemoryInteractionSource, InteractionSnapshot};

use crate::models::{
    CategoryId, ItemId, ItemMetadata, OrderLineEvent, ReviewEvent, UserId, WishlistEvent,
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Per-category interaction counts for one user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryActivity {
    pub review_counts: HashMap<CategoryId, u32>,
    pub review_rating_sums: HashMap<CategoryId, f64>,
    pub wishlist_counts: HashMap<CategoryId, u32>,
    pub order_counts: HashMap<CategoryId, u32>,
}

impl CategoryActivity {
    /// Every category the user touched through any stream
    pub fn categories(&self) -> BTreeSet<CategoryId> {
        self.review_counts
            .keys()
            .chain(self.wishlist_counts.keys())
            .chain(self.order_counts.keys())
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.review_counts.is_empty()
            && self.wishlist_counts.is_empty()
            && self.order_counts.is_empty()
    }
}

/// Read-only view over the collaborator's interaction and catalog data
#[async_trait]
pub trait InteractionSource: Send + Sync {
    async fn reviews(&self) -> Result<Vec<ReviewEvent>>;

    async fn wishlist(&self) -> Result<Vec<WishlistEvent>>;

    async fn order_lines(&self) -> Result<Vec<OrderLineEvent>>;

    /// Full catalog, including inactive items
    async fn items(&self) -> Result<Vec<ItemMetadata>>;

    async fn active_items(&self) -> Result<Vec<ItemMetadata>> {
        Ok(self
            .items()
            .await?
            .into_iter()
            .filter(|item| item.is_active)
            .collect())
    }

    /// Every user with at least one review, wishlist entry or order line,
    /// ascending
    async fn member_ids(&self) -> Result<Vec<UserId>> {
        let mut ids = BTreeSet::new();
        ids.extend(self.reviews().await?.into_iter().map(|r| r.user_id));
        ids.extend(self.wishlist().await?.into_iter().map(|w| w.user_id));
        ids.extend(self.order_lines().await?.into_iter().map(|o| o.user_id));
        Ok(ids.into_iter().collect())
    }

    /// Items the user already ordered, wishlisted or reviewed
    async fn interacted_items(&self, user_id: UserId) -> Result<HashSet<ItemId>> {
        let mut ids = HashSet::new();
        ids.extend(
            self.order_lines()
                .await?
                .into_iter()
                .filter(|o| o.user_id == user_id)
                .map(|o| o.item_id),
        );
        ids.extend(
            self.wishlist()
                .await?
                .into_iter()
                .filter(|w| w.user_id == user_id)
                .map(|w| w.item_id),
        );
        ids.extend(
            self.reviews()
                .await?
                .into_iter()
                .filter(|r| r.user_id == user_id)
                .map(|r| r.item_id),
        );
        Ok(ids)
    }

    async fn category_activity(&self, user_id: UserId) -> Result<CategoryActivity> {
        let categories: HashMap<ItemId, CategoryId> = self
            .items()
            .await?
            .into_iter()
            .map(|item| (item.item_id, item.category_id))
            .collect();

        let mut activity = CategoryActivity::default();

        for review in self.reviews().await? {
            if review.user_id != user_id {
                continue;
            }
            if let Some(&cid) = categories.get(&review.item_id) {
                *activity.review_counts.entry(cid).or_insert(0) += 1;
                *activity.review_rating_sums.entry(cid).or_insert(0.0) += review.rating;
            }
        }

        for entry in self.wishlist().await? {
            if entry.user_id != user_id {
                continue;
            }
            if let Some(&cid) = categories.get(&entry.item_id) {
                *activity.wishlist_counts.entry(cid).or_insert(0) += 1;
            }
        }

        for line in self.order_lines().await? {
            if line.user_id != user_id {
                continue;
            }
            if let Some(&cid) = categories.get(&line.item_id) {
                *activity.order_counts.entry(cid).or_insert(0) += 1;
            }
        }

        Ok(activity)
    }
}
