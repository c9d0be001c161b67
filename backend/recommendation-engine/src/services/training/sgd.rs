// ============================================
// Biased MF Trainer (SGD + early stopping)
// ============================================
//
// prediction = mu + b_u + b_i + <p_u, q_i>
// error      = target - prediction
// b   += lr * (error - reg * b)
// p_u += lr * (error * q_i - reg * p_u)   (pre-update q_i)
// q_i += lr * (error * p_u - reg * q_i)   (pre-update p_u)
//
// With user centering the target is rating - mean(u), and mean(u) is
// added back when scoring the validation split.

use super::{Result, TrainingError, TrainingSummary};
use crate::config::TrainingConfig;
use crate::models::Rating;
use crate::services::model::{IdIndex, MfModel};
use crate::utils::std_dev;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info};

/// Minimum RMSE gain that counts as an improvement
const IMPROVEMENT_EPSILON: f64 = 1e-5;

/// Standard deviation of the initial latent factors
const INIT_STD: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
struct Triple {
    u: usize,
    i: usize,
    rating: f64,
}

#[derive(Debug, Clone)]
struct Parameters {
    user_factors: Array2<f64>,
    item_factors: Array2<f64>,
    user_bias: Array1<f64>,
    item_bias: Array1<f64>,
}

impl Parameters {
    fn dot(&self, u: usize, i: usize) -> f64 {
        self.user_factors.row(u).dot(&self.item_factors.row(i))
    }

    fn step(&mut self, u: usize, i: usize, target: f64, global_mean: f64, lr: f64, reg: f64) {
        let pred = global_mean + self.user_bias[u] + self.item_bias[i] + self.dot(u, i);
        let err = target - pred;

        self.user_bias[u] += lr * (err - reg * self.user_bias[u]);
        self.item_bias[i] += lr * (err - reg * self.item_bias[i]);

        for k in 0..self.user_factors.ncols() {
            let pu = self.user_factors[[u, k]];
            let qi = self.item_factors[[i, k]];
            self.user_factors[[u, k]] += lr * (err * qi - reg * pu);
            self.item_factors[[i, k]] += lr * (err * pu - reg * qi);
        }
    }
}

/// Trained model plus its run summary
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: MfModel,
    pub summary: TrainingSummary,
}

#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn validate(&self) -> Result<()> {
        let c = &self.config;
        if c.factors == 0 {
            return Err(TrainingError::InvalidParameters(
                "factors must be at least 1".to_string(),
            ));
        }
        if !(c.learning_rate.is_finite() && c.learning_rate > 0.0) {
            return Err(TrainingError::InvalidParameters(format!(
                "learning rate must be positive, got {}",
                c.learning_rate
            )));
        }
        if !(c.regularization.is_finite() && c.regularization >= 0.0) {
            return Err(TrainingError::InvalidParameters(format!(
                "regularization must be non-negative, got {}",
                c.regularization
            )));
        }
        Ok(())
    }

    /// Fit a model on `ratings`. Deterministic for a fixed seed and input.
    pub fn fit(&self, ratings: &[Rating]) -> Result<TrainingOutcome> {
        if ratings.is_empty() {
            return Err(TrainingError::NoTrainingData);
        }
        self.validate()?;

        let c = &self.config;
        let mut rng = StdRng::seed_from_u64(c.seed);

        let users = IdIndex::from_unsorted(ratings.iter().map(|r| r.user_id));
        let items = IdIndex::from_unsorted(ratings.iter().map(|r| r.item_id));
        let num_users = users.len();
        let num_items = items.len();

        let mut data: Vec<Triple> = ratings
            .iter()
            .filter_map(|r| {
                Some(Triple {
                    u: users.index_of(r.user_id)?,
                    i: items.index_of(r.item_id)?,
                    rating: r.value,
                })
            })
            .collect();
        data.shuffle(&mut rng);

        let val_size = ((c.validation_fraction * data.len() as f64) as usize)
            .max(1)
            .min(data.len());
        let validation: Vec<Triple> = data[..val_size].to_vec();
        let mut train: Vec<Triple> = data[val_size..].to_vec();

        // User means come from the full dataset, before the split
        let user_mean = if c.center_user {
            let mut sums = vec![0.0; num_users];
            let mut counts = vec![0usize; num_users];
            for t in &data {
                sums[t.u] += t.rating;
                counts[t.u] += 1;
            }
            Some(Array1::from_iter(
                sums.iter()
                    .zip(&counts)
                    .map(|(s, &n)| s / n.max(1) as f64),
            ))
        } else {
            None
        };

        let target = |t: &Triple| match &user_mean {
            Some(mean) => t.rating - mean[t.u],
            None => t.rating,
        };

        let global_mean = if train.is_empty() {
            0.0
        } else {
            train.iter().map(target).sum::<f64>() / train.len() as f64
        };

        let normal = Normal::new(0.0, INIT_STD)
            .map_err(|e| TrainingError::InvalidParameters(e.to_string()))?;
        let mut params = Parameters {
            user_factors: Array2::from_shape_simple_fn((num_users, c.factors), || {
                normal.sample(&mut rng)
            }),
            item_factors: Array2::from_shape_simple_fn((num_items, c.factors), || {
                normal.sample(&mut rng)
            }),
            user_bias: Array1::zeros(num_users),
            item_bias: Array1::zeros(num_items),
        };

        let validation_rmse = |p: &Parameters| -> f64 {
            let sq: f64 = validation
                .iter()
                .map(|t| {
                    let mut pred = global_mean + p.user_bias[t.u] + p.item_bias[t.i] + p.dot(t.u, t.i);
                    if let Some(mean) = &user_mean {
                        pred += mean[t.u];
                    }
                    (t.rating - pred).powi(2)
                })
                .sum();
            (sq / validation.len() as f64).sqrt()
        };

        info!(
            users = num_users,
            items = num_items,
            ratings = data.len(),
            train_rows = train.len(),
            validation_rows = validation.len(),
            factors = c.factors,
            epochs = c.epochs,
            center_user = c.center_user,
            "Starting MF training"
        );

        let mut best_rmse = f64::INFINITY;
        let mut best: Option<(Parameters, usize)> = None;
        let mut patience_left = c.patience;
        let mut epoch_rmse = Vec::with_capacity(c.epochs);

        for epoch in 1..=c.epochs {
            train.shuffle(&mut rng);
            for t in &train {
                params.step(
                    t.u,
                    t.i,
                    target(t),
                    global_mean,
                    c.learning_rate,
                    c.regularization,
                );
            }

            let rmse = validation_rmse(&params);
            epoch_rmse.push(rmse);
            debug!(epoch = epoch, rmse = rmse, "Epoch finished");

            if rmse + IMPROVEMENT_EPSILON < best_rmse {
                best_rmse = rmse;
                best = Some((params.clone(), epoch));
                patience_left = c.patience;
            } else {
                patience_left = patience_left.saturating_sub(1);
                if patience_left == 0 {
                    info!(epoch = epoch, best_rmse = best_rmse, "Early stopping");
                    break;
                }
            }
        }

        let best_epoch = match best {
            Some((snapshot, epoch)) => {
                params = snapshot;
                Some(epoch)
            }
            None => None,
        };
        let final_rmse = match best_epoch {
            Some(_) => best_rmse,
            None => validation_rmse(&params),
        };

        let summary = TrainingSummary {
            num_users,
            num_items,
            num_ratings: data.len(),
            train_rows: train.len(),
            validation_rows: validation.len(),
            validation_rmse: final_rmse,
            best_epoch,
            epochs_run: epoch_rmse.len(),
            epoch_rmse,
            user_bias_std: std_dev(params.user_bias.as_slice().unwrap_or(&[])),
            item_bias_std: std_dev(params.item_bias.as_slice().unwrap_or(&[])),
            model_path: None,
        };

        let model = MfModel::new(
            params.user_factors,
            params.item_factors,
            params.user_bias,
            params.item_bias,
            global_mean,
            user_mean,
            c.center_user,
            users,
            items,
        )?;

        if !model.is_finite() || !summary.validation_rmse.is_finite() {
            return Err(TrainingError::NonFiniteParameters);
        }

        info!(
            validation_rmse = summary.validation_rmse,
            best_epoch = ?summary.best_epoch,
            epochs_run = summary.epochs_run,
            user_bias_std = summary.user_bias_std,
            item_bias_std = summary.item_bias_std,
            "MF training complete"
        );

        Ok(TrainingOutcome { model, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scorer::predict;
    use rand::Rng;

    fn random_ratings(users: i64, items: i64, seed: u64) -> Vec<Rating> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ratings = Vec::new();
        for u in 1..=users {
            for i in 1..=items {
                ratings.push(Rating::new(u, i, rng.gen_range(1..=5) as f64));
            }
        }
        ratings
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            factors: 8,
            epochs: 20,
            learning_rate: 0.01,
            regularization: 0.01,
            seed: 42,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_end_to_end_small_dataset() {
        let ratings = random_ratings(3, 10, 7);
        let outcome = Trainer::new(small_config()).fit(&ratings).unwrap();

        assert_eq!(outcome.summary.num_users, 3);
        assert_eq!(outcome.summary.num_items, 10);
        assert_eq!(outcome.summary.validation_rows, 3);
        assert_eq!(outcome.summary.train_rows, 27);
        assert!(outcome.summary.validation_rmse <= 4.0);

        for u in 1..=3 {
            for i in 1..=10 {
                let score = predict(&outcome.model, u, i).unwrap();
                assert!(score.is_finite(), "score for ({}, {}) not finite", u, i);
            }
        }
    }

    #[test]
    fn test_training_is_deterministic() {
        let ratings = random_ratings(4, 12, 3);
        let trainer = Trainer::new(small_config());

        let a = trainer.fit(&ratings).unwrap();
        let b = trainer.fit(&ratings).unwrap();

        assert_eq!(a.model, b.model);
        assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let ratings = random_ratings(4, 6, 11);
        let mut reversed = ratings.clone();
        reversed.reverse();

        let trainer = Trainer::new(small_config());
        let a = trainer.fit(&ratings).unwrap();
        let b = trainer.fit(&reversed).unwrap();

        // Dense indices are sorted ids, but shuffling starts from input order
        assert_eq!(a.model.users, b.model.users);
        assert_eq!(a.model.items, b.model.items);
    }

    #[test]
    fn test_restored_model_is_best_epoch() {
        let ratings = random_ratings(6, 15, 5);
        let config = TrainingConfig {
            epochs: 80,
            learning_rate: 0.05,
            patience: 2,
            ..small_config()
        };
        let outcome = Trainer::new(config).fit(&ratings).unwrap();
        let summary = &outcome.summary;

        let best_epoch = summary.best_epoch.expect("at least one epoch improves");
        assert_eq!(summary.epoch_rmse[best_epoch - 1], summary.validation_rmse);
        for later in &summary.epoch_rmse[best_epoch..] {
            assert!(summary.validation_rmse <= later + IMPROVEMENT_EPSILON);
        }
        assert!(summary.epochs_run <= 80);
    }

    #[test]
    fn test_centered_training_reconstructs_mean() {
        let ratings = random_ratings(3, 8, 9);
        let config = TrainingConfig {
            center_user: true,
            ..small_config()
        };
        let outcome = Trainer::new(config).fit(&ratings).unwrap();

        assert!(outcome.model.center_user);
        let means = outcome.model.user_mean.as_ref().unwrap();
        for u in 1..=3i64 {
            let idx = outcome.model.user_index(u).unwrap();
            let expected: f64 = ratings
                .iter()
                .filter(|r| r.user_id == u)
                .map(|r| r.value)
                .sum::<f64>()
                / 8.0;
            assert!((means[idx] - expected).abs() < 1e-9);
        }
        // Residual targets keep the global mean near zero
        assert!(outcome.model.global_mean.abs() < 1.0);
    }

    #[test]
    fn test_zero_ratings_fail() {
        let err = Trainer::new(small_config()).fit(&[]).unwrap_err();
        assert!(matches!(err, TrainingError::NoTrainingData));
    }

    #[test]
    fn test_single_rating_goes_to_validation() {
        let outcome = Trainer::new(small_config())
            .fit(&[Rating::new(1, 1, 4.0)])
            .unwrap();
        assert_eq!(outcome.summary.validation_rows, 1);
        assert_eq!(outcome.summary.train_rows, 0);
        assert!(outcome.model.is_finite());
    }

    #[test]
    fn test_invalid_learning_rate_rejected() {
        let config = TrainingConfig {
            learning_rate: 0.0,
            ..small_config()
        };
        let err = Trainer::new(config)
            .fit(&[Rating::new(1, 1, 4.0)])
            .unwrap_err();
        assert!(matches!(err, TrainingError::InvalidParameters(_)));
    }
}
