//! Pool selection strategy
//!
//! When a caller does not name a pool, the healthy pool with the lowest
//! `in_use / weight` score is chosen. Ties go to the first registered pool.

use crate::constants::pool::MIN_WEIGHT;

/// Load figures of one candidate pool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolLoad {
    pub healthy: bool,
    pub in_use: usize,
    pub weight: f64,
}

impl PoolLoad {
    /// Selection score; lower is better
    #[must_use]
    pub fn score(&self) -> f64 {
        self.in_use as f64 / self.weight.max(MIN_WEIGHT)
    }
}

/// Select the index of the least loaded healthy pool
///
/// Returns `None` if no candidate is healthy.
#[must_use]
pub fn select_least_loaded<I>(candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = PoolLoad>,
{
    let mut best: Option<(usize, f64)> = None;

    for (index, load) in candidates.into_iter().enumerate() {
        if !load.healthy {
            continue;
        }
        let score = load.score();
        match best {
            Some((_, best_score)) if score >= best_score => {}
            _ => best = Some((index, score)),
        }
    }

    best.map(|(index, _)| index)
}
