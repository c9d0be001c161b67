//! Model Training Module
//!
//! Fits a biased matrix factorization with SGD and validation-based
//! early stopping.
//!
//! # Workflow
//! 1. Collect ratings (aggregated events or a pre-built file)
//! 2. Shuffle with a seeded RNG and hold out a validation split
//! 3. Run SGD epochs, snapshotting the best validation RMSE
//! 4. Restore the best snapshot and persist the model blob

pub mod pipeline;
pub mod sgd;

pub use pipeline::TrainingPipeline;
pub use sgd::{Trainer, TrainingOutcome};

use crate::services::model::{BlobError, ModelError};
use crate::services::source::SourceError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("No training data: seed interaction data before training")]
    NoTrainingData,

    #[error("Training produced non-finite parameters")]
    NonFiniteParameters,

    #[error("Invalid training parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to read training data: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to persist model: {0}")]
    Persist(#[from] BlobError),

    #[error("Model assembly failed: {0}")]
    Model(#[from] ModelError),

    #[error("Training worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, TrainingError>;

/// Observability summary of one training run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub num_users: usize,
    pub num_items: usize,
    pub num_ratings: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    /// RMSE of the restored (best) parameters
    pub validation_rmse: f64,
    /// 1-based epoch whose parameters were kept
    pub best_epoch: Option<usize>,
    pub epochs_run: usize,
    pub epoch_rmse: Vec<f64>,
    pub user_bias_std: f64,
    pub item_bias_std: f64,
    pub model_path: Option<PathBuf>,
}
