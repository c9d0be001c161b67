// ============================================
// Background Jobs Module
// ============================================
//
// Contains background job runners for:
// 1. Model retraining after collaborator write events
//
// These jobs can be triggered via:
// - RetrainTrigger::notify from request handlers
// - Command line argument (train)

pub mod retrain_worker;

pub use retrain_worker::{retrain_channel, RetrainReason, RetrainStats, RetrainTrigger, RetrainWorker};
