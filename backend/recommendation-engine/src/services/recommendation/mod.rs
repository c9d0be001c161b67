//! Recommendation Service
//!
//! Request-time entry point. Routes each request either through the MF
//! path (candidates, ranking, diversity) or the popularity fallback, and
//! memoizes final lists in the result cache.
//!
//! Every request produces a list; model problems degrade to the fallback
//! and only collaborator read failures surface as errors.

use crate::config::{Config, RankingConfig};
use crate::models::{
    CategoryId, CategoryStat, Diagnostics, FallbackReason, Recommendation, UserId,
};
use crate::services::cache::{hydrate, CacheKey, ResultCache};
use crate::services::candidates::{popular, CandidateGenerator};
use crate::services::diversity::CategoryCap;
use crate::services::evaluation::{EvaluationAccumulator, EvaluationMetrics};
use crate::services::ranking::{CategoryAffinity, Ranker};
use crate::services::scorer::predict;
use crate::services::source::{InteractionSource, SourceError};
use crate::services::store::{ModelStore, ModelSummary, StoreError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Collaborator read failed: {0}")]
    Source(#[from] SourceError),

    #[error("Model store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// One scored (user, item) pair from the sanity check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitySample {
    pub user_id: UserId,
    pub item_id: i64,
    pub score: Option<f64>,
}

pub struct RecommendationService {
    source: Arc<dyn InteractionSource>,
    store: Arc<ModelStore>,
    ranker: Ranker,
    cap: CategoryCap,
    cache: ResultCache,
    evaluation_member_limit: usize,
}

impl RecommendationService {
    pub fn new(config: &Config, source: Arc<dyn InteractionSource>, store: Arc<ModelStore>) -> Self {
        Self {
            source,
            store,
            ranker: Ranker::new(config.ranking.clone()),
            cap: CategoryCap::new(config.ranking.per_category_limit),
            cache: ResultCache::new(config.cache.ttl()),
            evaluation_member_limit: config.evaluation.member_limit,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn ranking_config(&self) -> &RankingConfig {
        self.ranker.config()
    }

    fn cache_key(&self, user_id: Option<UserId>, limit: usize) -> CacheKey {
        let config = self.ranking_config();
        CacheKey::new(
            user_id,
            limit,
            config.diversify,
            config.normalization,
            config.explore_ratio,
        )
    }

    /// Popularity ranking over the active catalog; scores are not exposed
    pub async fn popular(&self, limit: usize) -> Result<Vec<Recommendation>> {
        let items = self.source.active_items().await?;
        Ok(popular(&items, limit, &self.cap)
            .selected
            .into_iter()
            .map(|c| c.into_recommendation(false))
            .collect())
    }

    /// Ranked recommendations, served from the result cache when possible
    pub async fn recommend(&self, user_id: Option<UserId>, limit: usize) -> Result<Vec<Recommendation>> {
        let key = self.cache_key(user_id, limit);

        if let Some(rows) = self.cache.get(&key) {
            // Items deactivated since caching are not served
            let items = self.source.active_items().await?;
            return Ok(hydrate(rows, &items));
        }

        let (rows, _) = self.compute(user_id, limit).await?;
        self.cache.put(key, rows.clone());
        Ok(rows)
    }

    /// Same ranking as `recommend`, bypassing the cache, with counters
    pub async fn recommend_with_diagnostics(
        &self,
        user_id: Option<UserId>,
        limit: usize,
    ) -> Result<(Vec<Recommendation>, Diagnostics)> {
        self.compute(user_id, limit).await
    }

    async fn compute(
        &self,
        user_id: Option<UserId>,
        limit: usize,
    ) -> Result<(Vec<Recommendation>, Diagnostics)> {
        let mut diagnostics = Diagnostics::default();

        let Some(user_id) = user_id else {
            return self
                .fallback(None, limit, FallbackReason::AnonymousUser, diagnostics)
                .await;
        };

        let model = match self.store.get().await {
            Ok(model) => model,
            Err(err) => {
                warn!(user_id = user_id, error = %err, "Model not available");
                return self
                    .fallback(Some(user_id), limit, FallbackReason::ModelUnavailable, diagnostics)
                    .await;
            }
        };

        if !model.knows_user(user_id) {
            return self
                .fallback(Some(user_id), limit, FallbackReason::UnknownUser, diagnostics)
                .await;
        }

        let items = self.source.active_items().await?;
        let interacted = self.source.interacted_items(user_id).await?;
        let pool = CandidateGenerator::score(&model, user_id, &items, &interacted);

        diagnostics.total_active_items = pool.total_active_items;
        diagnostics.interacted_excluded_count = pool.interacted_excluded_count;
        diagnostics.scorable_items = pool.candidates.len();

        if pool.total_active_items == pool.interacted_excluded_count {
            return self
                .fallback(Some(user_id), limit, FallbackReason::NoActiveItems, diagnostics)
                .await;
        }
        if pool.is_empty() {
            return self
                .fallback(Some(user_id), limit, FallbackReason::NoScorableItems, diagnostics)
                .await;
        }

        let activity = self.source.category_activity(user_id).await?;
        let affinity = CategoryAffinity::from_activity(&activity);

        let outcome = self.ranker.rank(pool.candidates, &affinity, limit);

        diagnostics.explore_count = outcome.explore_count;
        diagnostics.selected_after_diversify = outcome.ranked.len();
        diagnostics.filled_by_backfill = outcome.filled_by_backfill;

        debug!(
            user_id = user_id,
            limit = limit,
            scorable = diagnostics.scorable_items,
            excluded = diagnostics.interacted_excluded_count,
            returned = outcome.ranked.len(),
            "MF recommendations ranked"
        );

        let rows = outcome
            .ranked
            .into_iter()
            .map(|c| c.into_recommendation(true))
            .collect();
        Ok((rows, diagnostics))
    }

    async fn fallback(
        &self,
        user_id: Option<UserId>,
        limit: usize,
        reason: FallbackReason,
        mut diagnostics: Diagnostics,
    ) -> Result<(Vec<Recommendation>, Diagnostics)> {
        info!(
            user_id = ?user_id,
            limit = limit,
            reason = reason.as_str(),
            "MF fallback to popularity"
        );
        let rows = self.popular(limit).await?;
        diagnostics.fallback_reason = Some(reason);
        diagnostics.selected_after_diversify = rows.len();
        Ok((rows, diagnostics))
    }

    /// Per-category activity of `user_id` next to what is recommended now
    pub async fn category_stats(&self, user_id: UserId, limit: usize) -> Result<Vec<CategoryStat>> {
        let activity = self.source.category_activity(user_id).await?;
        let recommended = self.recommend(Some(user_id), limit).await?;

        let mut recommend_counts: HashMap<CategoryId, u32> = HashMap::new();
        for row in &recommended {
            *recommend_counts.entry(row.category_id).or_insert(0) += 1;
        }

        let mut categories: BTreeSet<CategoryId> = activity.categories();
        categories.extend(recommend_counts.keys().copied());

        let mut stats: Vec<CategoryStat> = categories
            .into_iter()
            .map(|cid| {
                let review_count = activity.review_counts.get(&cid).copied().unwrap_or(0);
                let rating_sum = activity.review_rating_sums.get(&cid).copied().unwrap_or(0.0);
                let avg_rating = if review_count > 0 {
                    round2(rating_sum / review_count as f64)
                } else {
                    0.0
                };
                CategoryStat {
                    category_id: cid,
                    review_count,
                    avg_rating,
                    wishlist_count: activity.wishlist_counts.get(&cid).copied().unwrap_or(0),
                    order_count: activity.order_counts.get(&cid).copied().unwrap_or(0),
                    recommend_count: recommend_counts.get(&cid).copied().unwrap_or(0),
                }
            })
            .collect();

        // Categories arrive in id order, so equal counts stay sorted by id
        stats.sort_by(|a, b| {
            (b.recommend_count, b.order_count, b.wishlist_count, b.review_count).cmp(&(
                a.recommend_count,
                a.order_count,
                a.wishlist_count,
                a.review_count,
            ))
        });
        Ok(stats)
    }

    /// Shape of the model, loading it if needed
    pub async fn model_summary(&self) -> ModelSummary {
        match self.store.get().await {
            Ok(model) => ModelSummary::of(Some(model.as_ref())),
            Err(err) => {
                warn!(error = %err, "Model summary requested but no model available");
                ModelSummary::default()
            }
        }
    }

    /// Score a batch of users offline. When more users are given than the
    /// configured member limit, a seeded sample of them is evaluated.
    pub async fn evaluate(
        &self,
        user_ids: &[UserId],
        limit: usize,
        seed: u64,
    ) -> Result<EvaluationMetrics> {
        let member_limit = self.evaluation_member_limit;
        let members: Vec<UserId> = if member_limit > 0 && user_ids.len() > member_limit {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut sampled: Vec<UserId> =
                user_ids.choose_multiple(&mut rng, member_limit).copied().collect();
            sampled.sort_unstable();
            sampled
        } else {
            user_ids.to_vec()
        };

        let mut acc = EvaluationAccumulator::new();
        for &user_id in &members {
            let rows = self.recommend(Some(user_id), limit).await?;
            acc.record(user_id, &rows);
        }

        let metrics = acc.finish(seed);
        info!(
            members = members.len(),
            users_evaluated = metrics.users_evaluated,
            unique_items_covered = metrics.unique_items_covered,
            top10_share = metrics.top10_share,
            avg_jaccard = metrics.avg_jaccard_across_users,
            "Evaluation complete"
        );
        Ok(metrics)
    }

    /// Score the first `min(3, users, items)` (user, item) id pairs
    pub async fn sanity_check(&self) -> Result<Vec<SanitySample>> {
        let model = self.store.get().await?;
        let samples = 3.min(model.num_users()).min(model.num_items());

        Ok(model
            .users
            .ids()
            .iter()
            .zip(model.items.ids())
            .take(samples)
            .map(|(&user_id, &item_id)| SanitySample {
                user_id,
                item_id,
                score: predict(&model, user_id, item_id),
            })
            .collect())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(4.456), 4.46);
        assert_eq!(round2(3.0), 3.0);
        assert_eq!(round2(2.333_333), 2.33);
    }
}
