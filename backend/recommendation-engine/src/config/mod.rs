use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub training: TrainingConfig,
    pub aggregation: AggregationConfig,
    pub ranking: RankingConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    /// JSON snapshot of the collaborator streams, used by the binary
    pub events_path: PathBuf,
    pub retrain_queue_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    pub factors: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub regularization: f64,
    pub seed: u64,
    pub patience: usize,
    pub center_user: bool,
    pub validation_fraction: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    pub review_weight: f64,
    pub wishlist_rating: f64,
    pub order_rating: f64,
    /// Multiplier applied to synthetic seed accounts
    pub dummy_weight: f64,
    pub dummy_user_min: i64,
    pub dummy_user_max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    ZScore,
    None,
}

impl ScoreNormalization {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreNormalization::ZScore => "zscore",
            ScoreNormalization::None => "none",
        }
    }
}

impl FromStr for ScoreNormalization {
    type Err = std::convert::Infallible;

    /// Anything other than `zscore` ranks on raw scores
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "zscore" | "z-score" | "z_score" => ScoreNormalization::ZScore,
            _ => ScoreNormalization::None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    pub diversify: bool,
    pub per_category_limit: usize,
    pub normalization: ScoreNormalization,
    pub explore_ratio: f64,
    pub category_bonus: f64,
    pub prefer_min_per_category: usize,
    pub prefer_max_per_category: usize,
    /// Seed for exploration sampling
    pub seed: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Zero disables the result cache
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingDataSource {
    /// Aggregate reviews, wishlist and orders from the collaborator
    Events,
    /// Pre-built `member_id,product_id,rating` file
    File,
}

impl FromStr for TrainingDataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "events" | "db" => Ok(TrainingDataSource::Events),
            "file" | "csv" => Ok(TrainingDataSource::File),
            other => Err(format!("unknown training source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub model_path: PathBuf,
    pub auto_train: bool,
    pub train_source: TrainingDataSource,
    pub ratings_path: PathBuf,
}

/// Offline recommendation-quality run
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationConfig {
    /// Users sampled per run; zero evaluates everyone
    pub member_limit: usize,
    pub rec_limit: usize,
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            member_limit: 200,
            rec_limit: 20,
            seed: 42,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "recommendation-engine".to_string(),
            events_path: PathBuf::from("data/interactions.json"),
            retrain_queue_size: 16,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            factors: 24,
            epochs: 60,
            learning_rate: 0.01,
            regularization: 0.02,
            seed: 42,
            patience: 3,
            center_user: false,
            validation_fraction: 0.1,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            review_weight: 10.0,
            wishlist_rating: 5.0,
            order_rating: 8.0,
            dummy_weight: 0.1,
            dummy_user_min: 1,
            dummy_user_max: 100,
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            diversify: true,
            per_category_limit: 3,
            normalization: ScoreNormalization::ZScore,
            explore_ratio: 0.01,
            category_bonus: 1.0,
            prefer_min_per_category: 1,
            prefer_max_per_category: 2,
            seed: 42,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("mf_model.json"),
            auto_train: true,
            train_source: TrainingDataSource::Events,
            ratings_path: PathBuf::from("data/ratings.csv"),
        }
    }
}

impl Config {
    /// Load configuration from `.env` and the process environment.
    ///
    /// Malformed values are logged and replaced by their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let training_defaults = TrainingConfig::default();
        let aggregation_defaults = AggregationConfig::default();
        let ranking_defaults = RankingConfig::default();
        let service_defaults = ServiceConfig::default();
        let store_defaults = StoreConfig::default();

        let seed = env_parse("MF_SEED", training_defaults.seed);

        let training = TrainingConfig {
            factors: env_parse("MF_FACTORS", training_defaults.factors).max(1),
            epochs: env_parse("MF_EPOCHS", training_defaults.epochs),
            learning_rate: env_parse("MF_LR", training_defaults.learning_rate),
            regularization: env_parse("MF_REG", training_defaults.regularization),
            seed,
            patience: env_parse("MF_PATIENCE", training_defaults.patience).max(1),
            center_user: env_flag("MF_CENTER_USER", training_defaults.center_user),
            validation_fraction: env_parse(
                "MF_VALIDATION_FRACTION",
                training_defaults.validation_fraction,
            )
            .clamp(0.0, 0.5),
        };

        let aggregation = AggregationConfig {
            review_weight: env_parse("MF_REVIEW_WEIGHT", aggregation_defaults.review_weight)
                .max(0.0),
            wishlist_rating: env_parse("MF_WISHLIST_RATING", aggregation_defaults.wishlist_rating),
            order_rating: env_parse("MF_ORDER_RATING", aggregation_defaults.order_rating),
            dummy_weight: env_parse("MF_DUMMY_WEIGHT", aggregation_defaults.dummy_weight).max(0.0),
            dummy_user_min: env_parse("MF_DUMMY_USER_MIN", aggregation_defaults.dummy_user_min),
            dummy_user_max: env_parse("MF_DUMMY_USER_MAX", aggregation_defaults.dummy_user_max),
        };

        let prefer_min = env_parse(
            "MF_PREFER_MIN_PER_CATEGORY",
            ranking_defaults.prefer_min_per_category,
        );
        let prefer_max = env_parse(
            "MF_PREFER_MAX_PER_CATEGORY",
            ranking_defaults.prefer_max_per_category,
        )
        .max(prefer_min);

        let ranking = RankingConfig {
            diversify: env_flag("MF_DIVERSIFY_ENABLED", ranking_defaults.diversify),
            per_category_limit: env_parse(
                "MF_PER_CATEGORY_LIMIT",
                ranking_defaults.per_category_limit,
            )
            .max(1),
            normalization: env_parse("MF_SCORE_NORM", ranking_defaults.normalization),
            explore_ratio: env_parse("MF_EXPLORE_RATIO", ranking_defaults.explore_ratio)
                .clamp(0.0, 1.0),
            category_bonus: env_parse("MF_CATEGORY_BONUS", ranking_defaults.category_bonus),
            prefer_min_per_category: prefer_min,
            prefer_max_per_category: prefer_max,
            seed,
        };

        let cache = CacheConfig {
            ttl_secs: env_parse("MF_CACHE_TTL_SEC", CacheConfig::default().ttl_secs),
        };

        let store = StoreConfig {
            model_path: env::var("MF_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(store_defaults.model_path),
            auto_train: env_flag("MF_AUTO_TRAIN", store_defaults.auto_train),
            train_source: env_parse("MF_TRAIN_SOURCE", store_defaults.train_source),
            ratings_path: env::var("RATINGS_CSV_PATH")
                .map(PathBuf::from)
                .unwrap_or(store_defaults.ratings_path),
        };

        let service = ServiceConfig {
            service_name: env::var("SERVICE_NAME").unwrap_or(service_defaults.service_name),
            events_path: env::var("MF_EVENTS_PATH")
                .map(PathBuf::from)
                .unwrap_or(service_defaults.events_path),
            retrain_queue_size: env_parse(
                "MF_RETRAIN_QUEUE_SIZE",
                service_defaults.retrain_queue_size,
            )
            .max(1),
        };

        let evaluation_defaults = EvaluationConfig::default();
        let evaluation = EvaluationConfig {
            member_limit: env_parse(
                "MF_EXPERIMENT_MEMBER_LIMIT",
                evaluation_defaults.member_limit,
            ),
            rec_limit: env_parse("MF_EXPERIMENT_REC_LIMIT", evaluation_defaults.rec_limit),
            seed: env_parse("REC_SEED", seed),
        };

        Config {
            service,
            training,
            aggregation,
            ranking,
            cache,
            store,
            evaluation,
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key, value = %raw, error = %e, "Invalid config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => parse_flag(&raw).unwrap_or_else(|| {
            warn!(key = key, value = %raw, "Invalid boolean config value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
