//! Adaptive batch sizing
//!
//! Tracks the last [`ADAPTIVE_WINDOW`] processing durations of a channel.
//! Fast processing grows the effective batch size, slow processing shrinks it.

use std::collections::VecDeque;
use std::time::Duration;

use crate::constants::batch::{
    ADAPTIVE_FLOOR, ADAPTIVE_STEP, ADAPTIVE_WINDOW, FAST_PROCESSING, SLOW_PROCESSING,
};

#[derive(Debug, Clone)]
pub struct AdaptiveSizer {
    durations: VecDeque<Duration>,
    effective: usize,
    max: usize,
    floor: usize,
}

impl AdaptiveSizer {
    /// Start at `max_batch_size`
    #[must_use]
    pub fn new(max_batch_size: usize) -> Self {
        let max = max_batch_size.max(1);
        Self {
            durations: VecDeque::with_capacity(ADAPTIVE_WINDOW),
            effective: max,
            max,
            floor: ADAPTIVE_FLOOR.min(max),
        }
    }

    #[must_use]
    pub fn effective(&self) -> usize {
        self.effective
    }

    /// Rolling average processing time
    #[must_use]
    pub fn average(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let total: Duration = self.durations.iter().sum();
        Some(total / self.durations.len() as u32)
    }

    /// Record one processing time and return the new effective size
    pub fn record(&mut self, elapsed: Duration) -> usize {
        if self.durations.len() == ADAPTIVE_WINDOW {
            self.durations.pop_front();
        }
        self.durations.push_back(elapsed);

        if let Some(avg) = self.average() {
            if avg < FAST_PROCESSING {
                self.effective = (self.effective + ADAPTIVE_STEP).min(self.max);
            } else if avg > SLOW_PROCESSING {
                self.effective = self.effective.saturating_sub(ADAPTIVE_STEP).max(self.floor);
            }
        }
        self.effective
    }
}
