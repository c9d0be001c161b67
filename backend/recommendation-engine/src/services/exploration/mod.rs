// ============================================
// Exploration Module
// ============================================
//
// Explore-exploit blend for the MF path.
//
// The top `limit - explore_count` ranked items are kept as-is. The next
// EXPLORE_WINDOW items form the exploration window, from which
// `explore_count` items are drawn without replacement with probability
// proportional to their (non-negative) normalized score.
//
// The RNG is seeded per request, so identical inputs give identical lists.

use crate::models::Candidate;
use crate::utils::round_half_even;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Candidates considered for exploration after the exploit slice
pub const EXPLORE_WINDOW: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct Blend {
    /// Exploit slice followed by the sampled exploration items
    pub merged: Vec<Candidate>,
    pub explore_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Explorer {
    ratio: f64,
    seed: u64,
}

impl Explorer {
    pub fn new(ratio: f64, seed: u64) -> Self {
        Self {
            ratio: ratio.clamp(0.0, 1.0),
            seed,
        }
    }

    /// `round(limit * ratio)` with halves to even, never more than the
    /// items beyond `limit`
    pub fn explore_count(&self, limit: usize, scored: usize) -> usize {
        let wanted = round_half_even(limit as f64 * self.ratio) as usize;
        wanted.min(scored.saturating_sub(limit))
    }

    /// Split `sorted` into exploit and explore parts; `sorted` must already
    /// be in final ranking order
    pub fn blend(&self, sorted: &[Candidate], limit: usize) -> Blend {
        let explore_count = self.explore_count(limit, sorted.len());
        let base_count = limit.saturating_sub(explore_count).min(sorted.len());

        let mut merged: Vec<Candidate> = sorted[..base_count].to_vec();

        let window_end = (base_count + EXPLORE_WINDOW).min(sorted.len());
        let window = &sorted[base_count..window_end];

        if explore_count > 0 && !window.is_empty() {
            let weights: Vec<f64> = window
                .iter()
                .map(|c| c.normalized_score.max(0.0))
                .collect();
            let mut rng = StdRng::seed_from_u64(self.seed);
            for idx in sample_without_replacement(&weights, explore_count, &mut rng) {
                merged.push(window[idx].clone());
            }
        }

        Blend {
            merged,
            explore_count,
        }
    }
}

/// Weighted sampling without replacement by sequential draws.
///
/// Weights must be finite and non-negative. Once every remaining weight is
/// zero the rest of the draw is uniform over what is left.
pub fn sample_without_replacement<R: Rng + ?Sized>(
    weights: &[f64],
    count: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..weights.len()).collect();
    let mut picked = Vec::with_capacity(count.min(weights.len()));

    while picked.len() < count && !remaining.is_empty() {
        let total: f64 = remaining.iter().map(|&i| weights[i]).sum();

        let pos = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut chosen = None;
            for (pos, &i) in remaining.iter().enumerate() {
                if weights[i] <= 0.0 {
                    continue;
                }
                acc += weights[i];
                chosen = Some(pos);
                if target < acc {
                    break;
                }
            }
            // Rounding can leave target == total; the last positive weight wins
            chosen.unwrap_or(0)
        } else {
            rng.gen_range(0..remaining.len())
        };

        picked.push(remaining.remove(pos));
    }

    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::diversity::test_support::{candidate, ids};
    use std::collections::HashSet;

    fn ranked(n: i64) -> Vec<Candidate> {
        (0..n)
            .map(|i| candidate(i + 1, i % 4, (n - i) as f64))
            .collect()
    }

    #[test]
    fn test_explore_count_bounds() {
        let explorer = Explorer::new(0.2, 42);
        assert_eq!(explorer.explore_count(10, 100), 2);
        // Only one item beyond the limit
        assert_eq!(explorer.explore_count(10, 11), 1);
        assert_eq!(explorer.explore_count(10, 5), 0);
        // round(20 * 0.01) = 0 with the default ratio
        assert_eq!(Explorer::new(0.01, 42).explore_count(20, 500), 0);
    }

    #[test]
    fn test_explore_count_rounds_halves_to_even() {
        let explorer = Explorer::new(0.01, 42);
        // 0.5 -> 0, 1.5 -> 2, 2.5 -> 2
        assert_eq!(explorer.explore_count(50, 500), 0);
        assert_eq!(explorer.explore_count(150, 500), 2);
        assert_eq!(explorer.explore_count(250, 500), 2);
    }

    #[test]
    fn test_blend_keeps_exploit_prefix() {
        let sorted = ranked(40);
        let blend = Explorer::new(0.3, 7).blend(&sorted, 10);

        assert_eq!(blend.explore_count, 3);
        assert_eq!(blend.merged.len(), 10);
        assert_eq!(ids(&blend.merged[..7]), (1..=7).collect::<Vec<_>>());
        for c in &blend.merged[7..] {
            assert!(c.item_id > 7, "explored item must come from the window");
        }
        let unique: HashSet<i64> = blend.merged.iter().map(|c| c.item_id).collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_blend_is_deterministic_per_seed() {
        let sorted = ranked(60);
        let a = Explorer::new(0.5, 42).blend(&sorted, 10);
        let b = Explorer::new(0.5, 42).blend(&sorted, 10);
        assert_eq!(ids(&a.merged), ids(&b.merged));
    }

    #[test]
    fn test_zero_weight_items_never_drawn_while_positive_remain() {
        let weights = [0.0, 1.0, 0.0, 2.0];
        let mut rng = StdRng::seed_from_u64(1);
        let picked = sample_without_replacement(&weights, 2, &mut rng);

        let set: HashSet<usize> = picked.into_iter().collect();
        assert_eq!(set, HashSet::from([1, 3]));
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_uniform() {
        let weights = [0.0; 5];
        let mut rng = StdRng::seed_from_u64(3);
        let picked = sample_without_replacement(&weights, 5, &mut rng);

        let set: HashSet<usize> = picked.iter().copied().collect();
        assert_eq!(picked.len(), 5);
        assert_eq!(set.len(), 5);
    }
}
