pub mod aggregation;
pub mod cache;
pub mod candidates;
pub mod diversity;
pub mod evaluation;
pub mod exploration;
pub mod model;
pub mod ranking;
pub mod recommendation;
pub mod scorer;
pub mod source;
pub mod store;
pub mod training;

pub use aggregation::RatingAggregator;
pub use cache::ResultCache;
pub use candidates::CandidateGenerator;
pub use diversity::CategoryCap;
pub use evaluation::{EvaluationAccumulator, EvaluationMetrics};
pub use model::MfModel;
pub use ranking::Ranker;
pub use recommendation::RecommendationService;
pub use source::{InMemoryInteractionSource, InteractionSource};
pub use store::ModelStore;
pub use training::{Trainer, TrainingPipeline};
