pub mod config;
pub mod jobs;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use jobs::{retrain_channel, RetrainReason, RetrainTrigger, RetrainWorker};
pub use services::{
    InMemoryInteractionSource, InteractionSource, ModelStore, RecommendationService,
    TrainingPipeline,
};
