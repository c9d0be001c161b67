// ============================================
// Retrain Worker
// ============================================
//
// Write events (new order, review, wishlist change) ask for a retrain
// through a bounded queue instead of fitting on the request path.
//
// Workflow:
// 1. Callers hold a cloneable RetrainTrigger and call notify(reason)
// 2. The worker wakes up, drains every pending trigger into one retrain
// 3. Training runs on the blocking pool, the blob is persisted and the
//    store swaps the new model in
// 4. Failures are logged; the previous model stays authoritative
//
// A full queue already guarantees a retrain that will see the new data,
// so notify() drops the extra trigger instead of blocking.

use crate::services::store::ModelStore;
use crate::services::training::TrainingSummary;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainReason {
    Startup,
    Manual,
    OrderCreated,
    ReviewWritten,
    WishlistAdded,
    WishlistRemoved,
}

impl RetrainReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrainReason::Startup => "startup",
            RetrainReason::Manual => "manual",
            RetrainReason::OrderCreated => "order_created",
            RetrainReason::ReviewWritten => "review_written",
            RetrainReason::WishlistAdded => "wishlist_added",
            RetrainReason::WishlistRemoved => "wishlist_removed",
        }
    }
}

/// Cloneable handle for requesting a retrain
#[derive(Debug, Clone)]
pub struct RetrainTrigger {
    tx: mpsc::Sender<RetrainReason>,
}

impl RetrainTrigger {
    /// Queue a retrain without waiting.
    ///
    /// Returns `false` only when the worker is gone.
    pub fn notify(&self, reason: RetrainReason) -> bool {
        match self.tx.try_send(reason) {
            Ok(()) => {
                debug!(reason = reason.as_str(), "Retrain queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(reason = reason.as_str(), "Retrain queue full, coalesced");
                true
            }
            Err(TrySendError::Closed(_)) => {
                warn!(reason = reason.as_str(), "Retrain worker stopped, trigger dropped");
                false
            }
        }
    }
}

/// Counters for one worker lifetime
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrainStats {
    pub triggers_received: u64,
    pub retrains_run: u64,
    pub retrains_failed: u64,
}

pub struct RetrainWorker {
    rx: mpsc::Receiver<RetrainReason>,
    store: Arc<ModelStore>,
}

/// Create a trigger/worker pair over a queue of `queue_size`
pub fn retrain_channel(store: Arc<ModelStore>, queue_size: usize) -> (RetrainTrigger, RetrainWorker) {
    let (tx, rx) = mpsc::channel(queue_size.max(1));
    (RetrainTrigger { tx }, RetrainWorker { rx, store })
}

impl RetrainWorker {
    /// Run until every trigger handle is dropped
    pub async fn run(mut self) -> RetrainStats {
        let mut stats = RetrainStats::default();
        info!("Retrain worker started");

        while let Some(reason) = self.rx.recv().await {
            stats.triggers_received += 1;

            let mut coalesced = 0u64;
            while self.rx.try_recv().is_ok() {
                coalesced += 1;
            }
            stats.triggers_received += coalesced;

            match self.retrain_once(reason).await {
                Ok(summary) => {
                    stats.retrains_run += 1;
                    info!(
                        reason = reason.as_str(),
                        coalesced = coalesced,
                        ratings = summary.num_ratings,
                        validation_rmse = summary.validation_rmse,
                        "Retrain complete"
                    );
                }
                Err(e) => {
                    stats.retrains_failed += 1;
                    error!(
                        reason = reason.as_str(),
                        error = %format!("{:#}", e),
                        "Retrain failed, keeping current model"
                    );
                }
            }
        }

        info!(
            triggers = stats.triggers_received,
            retrains = stats.retrains_run,
            failed = stats.retrains_failed,
            "Retrain worker stopped"
        );
        stats
    }

    async fn retrain_once(&self, reason: RetrainReason) -> anyhow::Result<TrainingSummary> {
        let started = Instant::now();
        info!(reason = reason.as_str(), "Starting retrain");

        let summary = self
            .store
            .retrain()
            .await
            .with_context(|| format!("retrain triggered by {}", reason.as_str()))?;

        debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Retrain finished"
        );
        Ok(summary)
    }

    pub fn spawn(self) -> JoinHandle<RetrainStats> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{ItemMetadata, Rating, ReviewEvent};
    use crate::services::source::{InMemoryInteractionSource, InteractionSnapshot};
    use crate::services::training::{Trainer, TrainingPipeline};
    use chrono::Utc;

    fn store(dir: &tempfile::TempDir, source: Arc<InMemoryInteractionSource>) -> Arc<ModelStore> {
        let mut config = Config::default();
        config.store.model_path = dir.path().join("mf_model.json");
        config.training.epochs = 5;
        config.training.factors = 4;
        let pipeline = TrainingPipeline::new(&config, source);
        Arc::new(ModelStore::new(&config.store, pipeline))
    }

    fn source(reviews: Vec<ReviewEvent>) -> Arc<InMemoryInteractionSource> {
        let items = (1..=3)
            .map(|item_id| ItemMetadata {
                item_id,
                category_id: 1,
                is_active: true,
                created_at: Utc::now(),
                price: 0.0,
                avg_rating: 0.0,
                review_count: 0,
                order_count: 0,
            })
            .collect();
        Arc::new(InMemoryInteractionSource::new(InteractionSnapshot {
            reviews,
            items,
            ..InteractionSnapshot::default()
        }))
    }

    #[tokio::test]
    async fn test_full_queue_coalesces() {
        let dir = tempfile::tempdir().unwrap();
        let (trigger, mut worker) = retrain_channel(store(&dir, source(vec![])), 1);

        assert!(trigger.notify(RetrainReason::OrderCreated));
        assert!(trigger.notify(RetrainReason::ReviewWritten));

        assert_eq!(worker.rx.try_recv().ok(), Some(RetrainReason::OrderCreated));
        assert!(worker.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_after_worker_gone() {
        let dir = tempfile::tempdir().unwrap();
        let (trigger, worker) = retrain_channel(store(&dir, source(vec![])), 4);
        drop(worker);

        assert!(!trigger.notify(RetrainReason::Manual));
    }

    #[tokio::test]
    async fn test_worker_swaps_in_new_model() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(vec![ReviewEvent {
            user_id: 300,
            item_id: 1,
            rating: 5.0,
        }]);
        let store = store(&dir, src.clone());
        let (trigger, worker) = retrain_channel(store.clone(), 4);
        let handle = worker.spawn();

        src.record_order_line(301, 2);
        trigger.notify(RetrainReason::OrderCreated);
        drop(trigger);

        let stats = handle.await.unwrap();
        assert_eq!(stats.retrains_run, 1);
        assert_eq!(stats.retrains_failed, 0);

        let model = store.current().unwrap();
        assert!(model.knows_user(300));
        assert!(model.knows_user(301));
    }

    #[tokio::test]
    async fn test_failed_retrain_keeps_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, source(vec![]));

        let outcome = Trainer::new(Config::default().training)
            .fit(&[Rating::new(300, 1, 5.0), Rating::new(301, 2, 3.0)])
            .unwrap();
        let previous = store.swap(outcome.model);

        let (trigger, worker) = retrain_channel(store.clone(), 4);
        trigger.notify(RetrainReason::Manual);
        drop(trigger);
        let stats = worker.run().await;

        // No interaction data: training fails, the swapped-in model stays
        assert_eq!(stats.retrains_failed, 1);
        assert!(Arc::ptr_eq(&previous, &store.current().unwrap()));
    }
}
