//! Result Cache
//!
//! Short-TTL memoization of final ranked lists, keyed by everything that
//! changes the ranking. Entries are never invalidated by a retrain; they
//! simply expire. A TTL of zero turns the cache off.
//!
//! Expired entries are evicted when read and swept on insert at most once
//! per TTL, so keys that are never requested again do not pile up.

use crate::config::ScoreNormalization;
use crate::models::{ItemMetadata, Recommendation, UserId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: Option<UserId>,
    pub limit: usize,
    pub diversify: bool,
    pub normalization: ScoreNormalization,
    /// `f64::to_bits` of the exploration ratio
    explore_ratio_bits: u64,
}

impl CacheKey {
    pub fn new(
        user_id: Option<UserId>,
        limit: usize,
        diversify: bool,
        normalization: ScoreNormalization,
        explore_ratio: f64,
    ) -> Self {
        Self {
            user_id,
            limit,
            diversify,
            normalization,
            explore_ratio_bits: explore_ratio.to_bits(),
        }
    }

    pub fn explore_ratio(&self) -> f64 {
        f64::from_bits(self.explore_ratio_bits)
    }
}

#[derive(Debug, Clone)]
struct CachedEntry {
    rows: Vec<Recommendation>,
    expires_at: Instant,
}

impl CachedEntry {
    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct ResultCache {
    ttl: Duration,
    store: DashMap<CacheKey, CachedEntry>,
    last_sweep: Mutex<Instant>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            store: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Recommendation>> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Vec<Recommendation>> {
        if !self.is_enabled() {
            return None;
        }

        let expired = match self.store.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                debug!(user_id = ?key.user_id, limit = key.limit, "Result cache hit");
                return Some(entry.rows.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            // Guard dropped above; removing while holding it would deadlock
            self.store.remove_if(key, |_, entry| entry.is_expired_at(now));
        }
        debug!(user_id = ?key.user_id, limit = key.limit, "Result cache miss");
        None
    }

    /// Last writer wins when two requests race on the same key
    pub fn put(&self, key: CacheKey, rows: Vec<Recommendation>) {
        self.put_at(key, rows, Instant::now());
    }

    pub(crate) fn put_at(&self, key: CacheKey, rows: Vec<Recommendation>, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        self.sweep_expired(now);
        self.store.insert(
            key,
            CachedEntry {
                rows,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drop every expired entry, at most once per TTL
    fn sweep_expired(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock();
            if now.saturating_duration_since(*last) < self.ttl {
                return;
            }
            *last = now;
        }

        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired_at(now));
        let evicted = before.saturating_sub(self.store.len());
        if evicted > 0 {
            debug!(evicted = evicted, remaining = self.store.len(), "Result cache swept");
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

/// Re-join cached rows against live item metadata.
///
/// Rows whose item disappeared from the catalog are dropped; the category
/// is refreshed, the cached rating stats and score are kept.
pub fn hydrate(rows: Vec<Recommendation>, items: &[ItemMetadata]) -> Vec<Recommendation> {
    let live: HashMap<i64, &ItemMetadata> = items.iter().map(|item| (item.item_id, item)).collect();
    rows.into_iter()
        .filter_map(|mut row| {
            let item = live.get(&row.item_id)?;
            row.category_id = item.category_id;
            Some(row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(item_id: i64) -> Recommendation {
        Recommendation {
            item_id,
            category_id: 1,
            avg_rating: 4.0,
            review_count: 3,
            score: Some(1.5),
        }
    }

    fn key(user_id: Option<UserId>) -> CacheKey {
        CacheKey::new(user_id, 10, true, ScoreNormalization::ZScore, 0.01)
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ResultCache::new(Duration::from_secs(30));
        cache.put(key(Some(1)), vec![row(1), row(2)]);

        let hit = cache.get(&key(Some(1))).unwrap();
        assert_eq!(hit, vec![row(1), row(2)]);
        assert!(cache.get(&key(None)).is_none());
    }

    #[test]
    fn test_entry_expires() {
        let cache = ResultCache::new(Duration::from_secs(30));
        let now = Instant::now();
        cache.put_at(key(Some(1)), vec![row(1)], now);

        assert!(cache.get_at(&key(Some(1)), now + Duration::from_secs(29)).is_some());
        assert!(cache.get_at(&key(Some(1)), now + Duration::from_secs(31)).is_none());
        assert!(cache.is_empty(), "expired entry is evicted on read");
    }

    #[test]
    fn test_insert_sweeps_keys_never_read_again() {
        let cache = ResultCache::new(Duration::from_secs(30));
        let start = Instant::now();
        for user_id in 0..1_000 {
            cache.put_at(key(Some(user_id)), vec![row(1)], start);
        }
        assert_eq!(cache.len(), 1_000);

        let later = start + Duration::from_secs(3_600);
        cache.put_at(key(Some(5_000)), vec![row(2)], later);

        assert_eq!(cache.len(), 1);
        assert!(cache.get_at(&key(Some(5_000)), later).is_some());
        assert!(cache.get_at(&key(Some(0)), later).is_none());
    }

    #[test]
    fn test_sweep_keeps_live_entries() {
        let cache = ResultCache::new(Duration::from_secs(30));
        let start = Instant::now();
        cache.put_at(key(Some(1)), vec![row(1)], start);

        let later = start + Duration::from_secs(31);
        cache.put_at(key(Some(2)), vec![row(2)], later);
        cache.put_at(key(Some(3)), vec![row(3)], later + Duration::from_secs(1));

        // Key 1 expired and was swept; 2 and 3 are still fresh
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at(&key(Some(2)), later).is_some());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = ResultCache::new(Duration::ZERO);
        cache.put(key(Some(1)), vec![row(1)]);

        assert!(!cache.is_enabled());
        assert!(cache.get(&key(Some(1))).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_distinguishes_explore_ratio() {
        let a = CacheKey::new(Some(1), 10, true, ScoreNormalization::ZScore, 0.01);
        let b = CacheKey::new(Some(1), 10, true, ScoreNormalization::ZScore, 0.02);
        assert_ne!(a, b);
        assert_eq!(a.explore_ratio(), 0.01);
    }

    #[test]
    fn test_hydrate_drops_missing_items() {
        let items = vec![ItemMetadata {
            item_id: 2,
            category_id: 9,
            is_active: true,
            created_at: Utc::now(),
            price: 0.0,
            avg_rating: 0.0,
            review_count: 0,
            order_count: 0,
        }];

        let hydrated = hydrate(vec![row(1), row(2)], &items);
        assert_eq!(hydrated.len(), 1);
        assert_eq!(hydrated[0].item_id, 2);
        assert_eq!(hydrated[0].category_id, 9);
    }
}
