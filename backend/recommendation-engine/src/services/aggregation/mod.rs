// ============================================
// Rating Aggregator
// ============================================
//
// Merges review, wishlist and order streams into one scored
// user-item matrix. A pair seen through several streams keeps the
// largest weighted contribution, never the sum.

mod ratings_file;

pub use ratings_file::load_ratings_file;

use crate::config::AggregationConfig;
use crate::models::{
    ItemId, OrderLineEvent, Rating, RatingEvent, RatingSource, ReviewEvent, UserId, WishlistEvent,
};
use crate::services::source::{InteractionSource, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Sparse (user, item) -> weight map with deterministic iteration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionMatrix {
    entries: BTreeMap<(UserId, ItemId), f64>,
}

impl InteractionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a weighted signal, keeping the maximum per pair
    pub fn insert(&mut self, event: &RatingEvent) {
        let slot = self
            .entries
            .entry((event.user_id, event.item_id))
            .or_insert(f64::NEG_INFINITY);
        if event.weight > *slot {
            *slot = event.weight;
        }
    }

    pub fn get(&self, user_id: UserId, item_id: ItemId) -> Option<f64> {
        self.entries.get(&(user_id, item_id)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Triples ordered by (user, item)
    pub fn to_ratings(&self) -> Vec<Rating> {
        self.entries
            .iter()
            .map(|(&(user_id, item_id), &value)| Rating::new(user_id, item_id, value))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RatingAggregator {
    config: AggregationConfig,
}

impl RatingAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Down-weight applied to the configured synthetic account range
    pub fn account_class_weight(&self, user_id: UserId) -> f64 {
        if (self.config.dummy_user_min..=self.config.dummy_user_max).contains(&user_id) {
            self.config.dummy_weight
        } else {
            1.0
        }
    }

    pub fn review_event(&self, review: &ReviewEvent) -> RatingEvent {
        RatingEvent {
            user_id: review.user_id,
            item_id: review.item_id,
            weight: review.rating
                * self.config.review_weight
                * self.account_class_weight(review.user_id),
            source: RatingSource::Review,
        }
    }

    pub fn wishlist_event(&self, entry: &WishlistEvent) -> RatingEvent {
        RatingEvent {
            user_id: entry.user_id,
            item_id: entry.item_id,
            weight: self.config.wishlist_rating * self.account_class_weight(entry.user_id),
            source: RatingSource::Wishlist,
        }
    }

    pub fn order_event(&self, line: &OrderLineEvent) -> RatingEvent {
        RatingEvent {
            user_id: line.user_id,
            item_id: line.item_id,
            weight: self.config.order_rating * self.account_class_weight(line.user_id),
            source: RatingSource::Order,
        }
    }

    /// Build the matrix from already fetched streams
    pub fn aggregate(
        &self,
        reviews: &[ReviewEvent],
        wishlist: &[WishlistEvent],
        order_lines: &[OrderLineEvent],
    ) -> InteractionMatrix {
        let mut matrix = InteractionMatrix::new();

        reviews
            .iter()
            .map(|r| self.review_event(r))
            .chain(wishlist.iter().map(|w| self.wishlist_event(w)))
            .chain(order_lines.iter().map(|o| self.order_event(o)))
            .for_each(|event| matrix.insert(&event));

        debug!(
            reviews = reviews.len(),
            wishlist = wishlist.len(),
            order_lines = order_lines.len(),
            pairs = matrix.len(),
            "Interaction matrix aggregated"
        );

        matrix
    }

    /// Fetch every stream from the collaborator and aggregate it
    pub async fn collect(&self, source: &dyn InteractionSource) -> Result<InteractionMatrix> {
        let reviews = source.reviews().await?;
        let wishlist = source.wishlist().await?;
        let order_lines = source.order_lines().await?;
        Ok(self.aggregate(&reviews, &wishlist, &order_lines))
    }
}
