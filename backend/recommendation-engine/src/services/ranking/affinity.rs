use crate::models::CategoryId;
use crate::services::source::CategoryActivity;
use std::collections::HashMap;

const REVIEW_WEIGHT: f64 = 1.0;
const WISHLIST_WEIGHT: f64 = 0.8;
const ORDER_WEIGHT: f64 = 1.2;

/// Per-category affinity of one user, scaled into [0, 1]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryAffinity {
    weights: HashMap<CategoryId, f64>,
    interactions: HashMap<CategoryId, u32>,
}

impl CategoryAffinity {
    pub fn from_activity(activity: &CategoryActivity) -> Self {
        let mut raw: HashMap<CategoryId, f64> = HashMap::new();
        let mut interactions: HashMap<CategoryId, u32> = HashMap::new();

        let streams = [
            (&activity.review_counts, REVIEW_WEIGHT),
            (&activity.wishlist_counts, WISHLIST_WEIGHT),
            (&activity.order_counts, ORDER_WEIGHT),
        ];
        for (counts, weight) in streams {
            for (&cid, &count) in counts {
                *raw.entry(cid).or_insert(0.0) += count as f64 * weight;
                *interactions.entry(cid).or_insert(0) += count;
            }
        }

        let max = raw.values().copied().fold(0.0_f64, f64::max);
        let weights = if max > 0.0 {
            raw.into_iter().map(|(cid, w)| (cid, w / max)).collect()
        } else {
            HashMap::new()
        };

        Self {
            weights,
            interactions,
        }
    }

    /// Normalized weight; 0.0 for categories the user never touched
    pub fn weight(&self, category_id: CategoryId) -> f64 {
        self.weights.get(&category_id).copied().unwrap_or(0.0)
    }

    pub fn total_interactions(&self) -> u32 {
        self.interactions.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Touched categories, strongest affinity first, ties by id
    pub fn preferred_categories(&self) -> Vec<CategoryId> {
        let mut categories: Vec<CategoryId> = self.interactions.keys().copied().collect();
        categories.sort_by(|a, b| {
            self.weight(*b)
                .total_cmp(&self.weight(*a))
                .then_with(|| a.cmp(b))
        });
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity() -> CategoryActivity {
        let mut activity = CategoryActivity::default();
        activity.review_counts.insert(1, 2);
        activity.wishlist_counts.insert(2, 1);
        activity.order_counts.insert(3, 2);
        activity.order_counts.insert(1, 1);
        activity
    }

    #[test]
    fn test_weights_normalized_by_max() {
        let affinity = CategoryAffinity::from_activity(&activity());

        // cat 1: 2 * 1.0 + 1 * 1.2 = 3.2 is the max
        assert!((affinity.weight(1) - 1.0).abs() < 1e-12);
        assert!((affinity.weight(2) - 0.8 / 3.2).abs() < 1e-12);
        assert!((affinity.weight(3) - 2.4 / 3.2).abs() < 1e-12);
        assert_eq!(affinity.weight(99), 0.0);
        assert_eq!(affinity.total_interactions(), 6);
    }

    #[test]
    fn test_preferred_categories_order() {
        let affinity = CategoryAffinity::from_activity(&activity());
        assert_eq!(affinity.preferred_categories(), vec![1, 3, 2]);
    }

    #[test]
    fn test_ties_broken_by_category_id() {
        let mut activity = CategoryActivity::default();
        activity.review_counts.insert(9, 1);
        activity.review_counts.insert(4, 1);
        let affinity = CategoryAffinity::from_activity(&activity);
        assert_eq!(affinity.preferred_categories(), vec![4, 9]);
    }

    #[test]
    fn test_empty_activity() {
        let affinity = CategoryAffinity::from_activity(&CategoryActivity::default());
        assert!(affinity.is_empty());
        assert!(affinity.preferred_categories().is_empty());
    }
}
