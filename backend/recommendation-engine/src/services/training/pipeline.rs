use super::{Result, Trainer, TrainingError, TrainingOutcome};
use crate::config::{Config, TrainingDataSource};
use crate::models::Rating;
use crate::services::aggregation::{load_ratings_file, RatingAggregator};
use crate::services::model::save_model;
use crate::services::source::InteractionSource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Load ratings, fit, persist
///
/// Fitting runs on the blocking pool so the async runtime stays responsive
/// while a retrain is in progress.
#[derive(Clone)]
pub struct TrainingPipeline {
    trainer: Trainer,
    aggregator: RatingAggregator,
    source: Arc<dyn InteractionSource>,
    data_source: TrainingDataSource,
    ratings_path: PathBuf,
    model_path: PathBuf,
}

impl TrainingPipeline {
    pub fn new(config: &Config, source: Arc<dyn InteractionSource>) -> Self {
        Self {
            trainer: Trainer::new(config.training.clone()),
            aggregator: RatingAggregator::new(config.aggregation.clone()),
            source,
            data_source: config.store.train_source,
            ratings_path: config.store.ratings_path.clone(),
            model_path: config.store.model_path.clone(),
        }
    }

    pub async fn load_ratings(&self) -> Result<Vec<Rating>> {
        let ratings = match self.data_source {
            TrainingDataSource::Events => self
                .aggregator
                .collect(self.source.as_ref())
                .await?
                .to_ratings(),
            TrainingDataSource::File => load_ratings_file(&self.ratings_path)?,
        };
        info!(
            source = ?self.data_source,
            ratings = ratings.len(),
            "Loaded training ratings"
        );
        Ok(ratings)
    }

    /// Train on fresh data and write the blob to the configured path.
    ///
    /// The previous blob is only replaced once training succeeded.
    pub async fn run(&self) -> Result<TrainingOutcome> {
        let ratings = self.load_ratings().await?;
        if ratings.is_empty() {
            return Err(TrainingError::NoTrainingData);
        }

        let trainer = self.trainer.clone();
        let mut outcome = tokio::task::spawn_blocking(move || trainer.fit(&ratings))
            .await
            .map_err(|e| TrainingError::Worker(e.to_string()))??;

        save_model(&outcome.model, &self.model_path)?;
        outcome.summary.model_path = Some(self.model_path.clone());

        Ok(outcome)
    }
}
