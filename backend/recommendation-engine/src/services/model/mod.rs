//! Biased Matrix Factorization Model
//!
//! Immutable once trained. A retrain builds a brand-new `MfModel` which
//! the store swaps in as a whole.
//!
//! # Layout
//! - Factors and biases are dense arrays addressed by a stable dense index
//! - `IdIndex` maps external ids to dense indices in both directions

mod blob;

pub use blob::{load_model, save_model, BlobError, ModelBlob};

use crate::models::{ItemId, UserId};
use ndarray::{Array1, Array2};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Duplicate id in index: {0}")]
    DuplicateId(i64),
}

/// Bijective id <-> dense index map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdIndex {
    ids: Vec<i64>,
    positions: HashMap<i64, usize>,
}

impl IdIndex {
    /// Build from ids in dense order; duplicates are rejected
    pub fn from_ids(ids: Vec<i64>) -> Result<Self, ModelError> {
        let mut positions = HashMap::with_capacity(ids.len());
        for (idx, &id) in ids.iter().enumerate() {
            if positions.insert(id, idx).is_some() {
                return Err(ModelError::DuplicateId(id));
            }
        }
        Ok(Self { ids, positions })
    }

    /// Sorted, deduplicated index over `ids`
    pub fn from_unsorted<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        let mut ids: Vec<i64> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let positions = ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect();
        Self { ids, positions }
    }

    pub fn index_of(&self, id: i64) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn id_at(&self, idx: usize) -> Option<i64> {
        self.ids.get(idx).copied()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MfModel {
    pub user_factors: Array2<f64>,
    pub item_factors: Array2<f64>,
    pub user_bias: Array1<f64>,
    pub item_bias: Array1<f64>,
    pub global_mean: f64,
    /// Present only when the model was trained on user-centered targets
    pub user_mean: Option<Array1<f64>>,
    pub center_user: bool,
    pub users: IdIndex,
    pub items: IdIndex,
}

impl MfModel {
    /// Assemble a model, checking every array against the id maps
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_factors: Array2<f64>,
        item_factors: Array2<f64>,
        user_bias: Array1<f64>,
        item_bias: Array1<f64>,
        global_mean: f64,
        user_mean: Option<Array1<f64>>,
        center_user: bool,
        users: IdIndex,
        items: IdIndex,
    ) -> Result<Self, ModelError> {
        let num_users = users.len();
        let num_items = items.len();

        if user_factors.nrows() != num_users || user_bias.len() != num_users {
            return Err(ModelError::ShapeMismatch(format!(
                "{} user ids, {} factor rows, {} biases",
                num_users,
                user_factors.nrows(),
                user_bias.len()
            )));
        }
        if item_factors.nrows() != num_items || item_bias.len() != num_items {
            return Err(ModelError::ShapeMismatch(format!(
                "{} item ids, {} factor rows, {} biases",
                num_items,
                item_factors.nrows(),
                item_bias.len()
            )));
        }
        if user_factors.ncols() != item_factors.ncols() {
            return Err(ModelError::ShapeMismatch(format!(
                "user rank {} != item rank {}",
                user_factors.ncols(),
                item_factors.ncols()
            )));
        }
        if let Some(mean) = &user_mean {
            if mean.len() != num_users {
                return Err(ModelError::ShapeMismatch(format!(
                    "{} user ids, {} user means",
                    num_users,
                    mean.len()
                )));
            }
        }

        // Centering without stored means cannot be reconstructed
        let center_user = center_user && user_mean.is_some();

        Ok(Self {
            user_factors,
            item_factors,
            user_bias,
            item_bias,
            global_mean,
            user_mean,
            center_user,
            users,
            items,
        })
    }

    pub fn factors(&self) -> usize {
        self.user_factors.ncols()
    }

    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn user_index(&self, user_id: UserId) -> Option<usize> {
        self.users.index_of(user_id)
    }

    pub fn item_index(&self, item_id: ItemId) -> Option<usize> {
        self.items.index_of(item_id)
    }

    pub fn knows_user(&self, user_id: UserId) -> bool {
        self.user_index(user_id).is_some()
    }

    /// True when every parameter is finite
    pub fn is_finite(&self) -> bool {
        self.global_mean.is_finite()
            && self.user_factors.iter().all(|v| v.is_finite())
            && self.item_factors.iter().all(|v| v.is_finite())
            && self.user_bias.iter().all(|v| v.is_finite())
            && self.item_bias.iter().all(|v| v.is_finite())
            && self
                .user_mean
                .as_ref()
                .map_or(true, |m| m.iter().all(|v| v.is_finite()))
    }
}
