// ============================================
// Model Store
// ============================================
//
// Process-wide holder of the current model.
//
// get()        cached model, else load the blob, else (auto-train) fit once
// invalidate() drop the cached model; the next get() reloads
// swap()       replace the shared Arc in one step
//
// Readers clone the Arc and keep scoring against it even while a retrain
// swaps in a new model.

use crate::config::StoreConfig;
use crate::services::model::{load_model, BlobError, MfModel};
use crate::services::training::{TrainingError, TrainingOutcome, TrainingPipeline, TrainingSummary};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Model file I/O failed: {0}")]
    Io(std::io::Error),

    #[error("Model file is corrupt: {0}")]
    Corrupt(String),

    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Model training failed: {0}")]
    Training(#[from] TrainingError),
}

impl From<BlobError> for StoreError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                StoreError::Unavailable(format!("no model file: {}", e))
            }
            BlobError::Io(e) => StoreError::Io(e),
            BlobError::Decode(e) => StoreError::Corrupt(e.to_string()),
            BlobError::Invalid(e) => StoreError::Corrupt(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Shape of the currently loaded model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model_loaded: bool,
    pub num_users: usize,
    pub num_items: usize,
    pub factors: usize,
    pub center_user: bool,
}

impl ModelSummary {
    pub fn of(model: Option<&MfModel>) -> Self {
        match model {
            Some(m) => Self {
                model_loaded: true,
                num_users: m.num_users(),
                num_items: m.num_items(),
                factors: m.factors(),
                center_user: m.center_user,
            },
            None => Self::default(),
        }
    }
}

pub struct ModelStore {
    current: RwLock<Option<Arc<MfModel>>>,
    last_training: RwLock<Option<TrainingSummary>>,
    pipeline: TrainingPipeline,
    model_path: PathBuf,
    auto_train: bool,
    /// Serializes load/train so concurrent misses fit only once
    load_lock: Mutex<()>,
}

impl ModelStore {
    pub fn new(config: &StoreConfig, pipeline: TrainingPipeline) -> Self {
        Self {
            current: RwLock::new(None),
            last_training: RwLock::new(None),
            pipeline,
            model_path: config.model_path.clone(),
            auto_train: config.auto_train,
            load_lock: Mutex::new(()),
        }
    }

    /// Cached model without triggering a load
    pub fn current(&self) -> Option<Arc<MfModel>> {
        self.current.read().clone()
    }

    pub fn last_training_summary(&self) -> Option<TrainingSummary> {
        self.last_training.read().clone()
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary::of(self.current().as_deref())
    }

    pub async fn get(&self) -> Result<Arc<MfModel>> {
        if let Some(model) = self.current() {
            return Ok(model);
        }

        let _guard = self.load_lock.lock().await;
        // Another caller may have loaded while we waited
        if let Some(model) = self.current() {
            return Ok(model);
        }

        let load_err = match load_model(&self.model_path) {
            Ok(model) => {
                info!(path = %self.model_path.display(), "Model loaded from blob");
                return Ok(self.swap(model));
            }
            Err(err) => err,
        };

        if !self.auto_train {
            warn!(
                path = %self.model_path.display(),
                error = %load_err,
                "Model unavailable and auto-train disabled"
            );
            return Err(load_err.into());
        }

        warn!(
            path = %self.model_path.display(),
            error = %load_err,
            "Model load failed, training once"
        );

        // Exactly one training attempt per miss
        let outcome = self.pipeline.run().await?;
        Ok(self.install(outcome))
    }

    /// Train unconditionally and swap the result in
    pub async fn retrain(&self) -> Result<TrainingSummary> {
        let _guard = self.load_lock.lock().await;
        let outcome = self.pipeline.run().await?;
        let summary = outcome.summary.clone();
        self.install(outcome);
        Ok(summary)
    }

    fn install(&self, outcome: TrainingOutcome) -> Arc<MfModel> {
        *self.last_training.write() = Some(outcome.summary);
        self.swap(outcome.model)
    }

    /// Replace the shared model; in-flight readers keep the old Arc
    pub fn swap(&self, model: MfModel) -> Arc<MfModel> {
        let model = Arc::new(model);
        let previous = self.current.write().replace(Arc::clone(&model));
        info!(
            users = model.num_users(),
            items = model.num_items(),
            replaced = previous.is_some(),
            "Model swapped in"
        );
        model
    }

    pub fn invalidate(&self) {
        if self.current.write().take().is_some() {
            info!("Model cache invalidated");
        }
    }
}
