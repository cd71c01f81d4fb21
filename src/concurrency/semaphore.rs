//! Named semaphore registry
//!
//! Semaphores are created lazily on first use and live as long as the
//! registry. Limits can be resized at runtime: growing adds permits
//! immediately, shrinking retires permits as they drain.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, warn};

use super::error::ConcurrencyError;
use crate::types::SemaphoreLimit;

/// One named semaphore with its bookkeeping
#[derive(Debug)]
pub struct NamedSemaphore {
    name: String,
    semaphore: Arc<Semaphore>,
    limit: AtomicUsize,
    waits: AtomicU64,
    acquisitions: AtomicU64,
}

impl NamedSemaphore {
    fn new(name: &str, limit: SemaphoreLimit) -> Self {
        Self {
            name: name.to_string(),
            semaphore: Arc::new(Semaphore::new(limit.get())),
            limit: AtomicUsize::new(limit.get()),
            waits: AtomicU64::new(0),
            acquisitions: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current configured limit
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    /// Acquire a permit, counting a wait if none was immediately free
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ConcurrencyError> {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                self.waits.fetch_add(1, Ordering::Relaxed);
                debug!(semaphore = %self.name, "Waiting for permit");
                Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| ConcurrencyError::Cancelled(self.name.clone()))?
            }
            Err(TryAcquireError::Closed) => {
                return Err(ConcurrencyError::Cancelled(self.name.clone()));
            }
        };
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(permit)
    }

    /// Resize the semaphore
    ///
    /// Growing takes effect immediately. Shrinking retires free permits now
    /// and the remainder as borrowers release theirs.
    pub fn set_limit(&self, new_limit: SemaphoreLimit) {
        let new_limit = new_limit.get();
        let old_limit = self.limit.swap(new_limit, Ordering::AcqRel);

        if new_limit > old_limit {
            self.semaphore.add_permits(new_limit - old_limit);
        } else if new_limit < old_limit {
            let excess = u32::try_from(old_limit - new_limit).unwrap_or(u32::MAX);
            match Arc::clone(&self.semaphore).try_acquire_many_owned(excess) {
                Ok(permits) => permits.forget(),
                Err(_) => self.retire_permits_later(excess),
            }
        }

        debug!(
            semaphore = %self.name,
            old_limit,
            new_limit,
            "Semaphore limit changed"
        );
    }

    fn retire_permits_later(&self, excess: u32) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                semaphore = %self.name,
                excess,
                "No runtime available to retire permits; limit shrinks on next resize"
            );
            return;
        };
        let semaphore = Arc::clone(&self.semaphore);
        handle.spawn(async move {
            if let Ok(permits) = semaphore.acquire_many_owned(excess).await {
                permits.forget();
            }
        });
    }

    fn close(&self) {
        self.semaphore.close();
    }

    /// Read-only statistics for this semaphore
    #[must_use]
    pub fn stats(&self) -> SemaphoreStats {
        let limit = self.limit();
        let available = self.semaphore.available_permits();
        SemaphoreStats {
            name: self.name.clone(),
            limit,
            available,
            in_use: limit.saturating_sub(available),
            waits: self.waits.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one named semaphore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreStats {
    pub name: String,
    pub limit: usize,
    pub available: usize,
    pub in_use: usize,
    pub waits: u64,
    pub acquisitions: u64,
}

impl SemaphoreStats {
    /// Fraction of the limit currently held (0.0 to 1.0)
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.limit as f64).min(1.0)
    }
}

/// Registry of lazily created named semaphores
#[derive(Debug)]
pub struct SemaphoreRegistry {
    semaphores: DashMap<String, Arc<NamedSemaphore>>,
    default_limit: SemaphoreLimit,
}

impl SemaphoreRegistry {
    #[must_use]
    pub fn new(default_limit: SemaphoreLimit) -> Self {
        Self {
            semaphores: DashMap::new(),
            default_limit,
        }
    }

    /// Get the semaphore registered under `name`, creating it if needed
    ///
    /// A requested limit of 0 is clamped to 1. A limit that differs from an
    /// existing registration is ignored; use [`Self::set_limit`] to resize.
    pub fn get_or_create(&self, name: &str, limit: Option<usize>) -> Arc<NamedSemaphore> {
        let requested = limit.map(SemaphoreLimit::clamped);

        if let Some(existing) = self.semaphores.get(name) {
            if let Some(requested) = requested
                && requested.get() != existing.limit()
            {
                warn!(
                    semaphore = %name,
                    existing = existing.limit(),
                    requested = requested.get(),
                    "Ignoring different limit for existing semaphore"
                );
            }
            return Arc::clone(existing.value());
        }

        let limit = requested.unwrap_or(self.default_limit);
        let entry = self
            .semaphores
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(semaphore = %name, limit = limit.get(), "Created semaphore");
                Arc::new(NamedSemaphore::new(name, limit))
            });
        Arc::clone(entry.value())
    }

    /// Look up a semaphore without creating it
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<NamedSemaphore>> {
        self.semaphores.get(name).map(|s| Arc::clone(s.value()))
    }

    /// Resize (or create) the named semaphore
    pub fn set_limit(&self, name: &str, limit: usize) {
        let limit = SemaphoreLimit::clamped(limit);
        match self.get(name) {
            Some(existing) => existing.set_limit(limit),
            None => {
                self.get_or_create(name, Some(limit.get()));
            }
        }
    }

    /// Statistics for every registered semaphore, sorted by name
    #[must_use]
    pub fn stats(&self) -> Vec<SemaphoreStats> {
        let mut stats: Vec<_> = self.semaphores.iter().map(|s| s.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.semaphores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.semaphores.is_empty()
    }

    /// Close every semaphore; pending waiters fail with `Cancelled`
    pub fn close_all(&self) {
        for sem in self.semaphores.iter() {
            sem.close();
        }
    }
}
