use super::{InteractionSource, Result};
use crate::models::{ItemId, ItemMetadata, OrderLineEvent, ReviewEvent, UserId, WishlistEvent};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Serializable copy of every collaborator stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionSnapshot {
    #[serde(default)]
    pub reviews: Vec<ReviewEvent>,
    #[serde(default)]
    pub wishlist: Vec<WishlistEvent>,
    #[serde(default)]
    pub order_lines: Vec<OrderLineEvent>,
    #[serde(default)]
    pub items: Vec<ItemMetadata>,
}

/// In-process collaborator backed by a snapshot.
///
/// The `record_*` helpers keep the per-item aggregates in step with the
/// event streams, the way the catalog service would.
#[derive(Debug, Default)]
pub struct InMemoryInteractionSource {
    state: RwLock<InteractionSnapshot>,
}

impl InMemoryInteractionSource {
    pub fn new(snapshot: InteractionSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Load a JSON snapshot from disk
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let snapshot: InteractionSnapshot = serde_json::from_slice(&data)?;

        info!(
            path = %path.display(),
            reviews = snapshot.reviews.len(),
            wishlist = snapshot.wishlist.len(),
            order_lines = snapshot.order_lines.len(),
            items = snapshot.items.len(),
            "Interaction snapshot loaded"
        );

        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> InteractionSnapshot {
        self.state.read().clone()
    }

    pub fn upsert_item(&self, item: ItemMetadata) {
        let mut state = self.state.write();
        match state.items.iter_mut().find(|i| i.item_id == item.item_id) {
            Some(existing) => *existing = item,
            None => state.items.push(item),
        }
    }

    pub fn record_review(&self, user_id: UserId, item_id: ItemId, rating: f64) {
        let mut state = self.state.write();
        if let Some(item) = state.items.iter_mut().find(|i| i.item_id == item_id) {
            let total = item.avg_rating * item.review_count as f64 + rating;
            item.review_count += 1;
            item.avg_rating = total / item.review_count as f64;
        }
        state.reviews.push(ReviewEvent {
            user_id,
            item_id,
            rating,
        });
    }

    pub fn record_wishlist_add(&self, user_id: UserId, item_id: ItemId) {
        let mut state = self.state.write();
        let exists = state
            .wishlist
            .iter()
            .any(|w| w.user_id == user_id && w.item_id == item_id);
        if !exists {
            state.wishlist.push(WishlistEvent { user_id, item_id });
        }
    }

    pub fn record_wishlist_remove(&self, user_id: UserId, item_id: ItemId) {
        self.state
            .write()
            .wishlist
            .retain(|w| !(w.user_id == user_id && w.item_id == item_id));
    }

    pub fn record_order_line(&self, user_id: UserId, item_id: ItemId) {
        let mut state = self.state.write();
        if let Some(item) = state.items.iter_mut().find(|i| i.item_id == item_id) {
            item.order_count += 1;
        }
        state.order_lines.push(OrderLineEvent { user_id, item_id });
    }
}

#[async_trait]
impl InteractionSource for InMemoryInteractionSource {
    async fn reviews(&self) -> Result<Vec<ReviewEvent>> {
        Ok(self.state.read().reviews.clone())
    }

    async fn wishlist(&self) -> Result<Vec<WishlistEvent>> {
        Ok(self.state.read().wishlist.clone())
    }

    async fn order_lines(&self) -> Result<Vec<OrderLineEvent>> {
        Ok(self.state.read().order_lines.clone())
    }

    async fn items(&self) -> Result<Vec<ItemMetadata>> {
        Ok(self.state.read().items.clone())
    }
}
