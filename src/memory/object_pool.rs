//! Generic object pool
//!
//! Lock-free pool of reusable values backed by crossbeam's `SegQueue`. Values
//! are reset before they go back on the idle list; a value that fails to reset
//! is dropped instead of recycled.

use crossbeam::queue::SegQueue;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::BuildHasher;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::metrics::{EmitMetrics, MetricsSink};

/// A value could not be restored to its zero state
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to reset pooled value: {reason}")]
pub struct ResetError {
    reason: String,
}

impl ResetError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Reset failures only cost an allocation
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::DEBUG
    }
}

/// A value that can be restored to its zero state for reuse
pub trait Resettable {
    fn reset(&mut self) -> Result<(), ResetError>;
}

impl<T> Resettable for Vec<T> {
    fn reset(&mut self) -> Result<(), ResetError> {
        self.clear();
        Ok(())
    }
}

impl<T> Resettable for VecDeque<T> {
    fn reset(&mut self) -> Result<(), ResetError> {
        self.clear();
        Ok(())
    }
}

impl Resettable for String {
    fn reset(&mut self) -> Result<(), ResetError> {
        self.clear();
        Ok(())
    }
}

impl<K, V, S: BuildHasher> Resettable for HashMap<K, V, S> {
    fn reset(&mut self) -> Result<(), ResetError> {
        self.clear();
        Ok(())
    }
}

impl<T, S: BuildHasher> Resettable for HashSet<T, S> {
    fn reset(&mut self) -> Result<(), ResetError> {
        self.clear();
        Ok(())
    }
}

impl<K, V> Resettable for BTreeMap<K, V> {
    fn reset(&mut self) -> Result<(), ResetError> {
        self.clear();
        Ok(())
    }
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

struct Inner<T> {
    name: String,
    idle: SegQueue<T>,
    idle_count: AtomicUsize,
    factory: Factory<T>,
    min_size: usize,
    max_size: usize,
    created: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
}

impl<T> Inner<T> {
    /// Reserve one idle slot if the idle list is below `max_size`
    fn reserve_slot(&self) -> bool {
        let mut current = self.idle_count.load(Ordering::Relaxed);
        while current < self.max_size {
            match self.idle_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    fn pop_idle(&self) -> Option<T> {
        let value = self.idle.pop()?;
        self.idle_count.fetch_sub(1, Ordering::Relaxed);
        Some(value)
    }
}

/// Thread-safe pool of reusable values
///
/// Cloning is cheap and yields a handle to the same pool.
pub struct ObjectPool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.inner.name)
            .field("idle", &self.idle())
            .field("min_size", &self.inner.min_size)
            .field("max_size", &self.inner.max_size)
            .finish()
    }
}

impl<T: Resettable + Send + 'static> ObjectPool<T> {
    /// Create an empty pool
    ///
    /// `max_size` is raised to at least 1 and `min_size` clamped to it.
    pub fn new<F>(name: impl Into<String>, factory: F, min_size: usize, max_size: usize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let name = name.into();
        let max_size = max_size.max(1);
        if min_size > max_size {
            warn!(
                pool = %name,
                min_size,
                max_size,
                "Object pool min_size exceeds max_size, clamping"
            );
        }

        Self {
            inner: Arc::new(Inner {
                name,
                idle: SegQueue::new(),
                idle_count: AtomicUsize::new(0),
                factory: Box::new(factory),
                min_size: min_size.min(max_size),
                max_size,
                created: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                released: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Take an idle value, or create one if none is idle; never blocks
    pub fn get(&self) -> T {
        if let Some(value) = self.inner.pop_idle() {
            self.inner.reused.fetch_add(1, Ordering::Relaxed);
            return value;
        }
        self.inner.created.fetch_add(1, Ordering::Relaxed);
        (self.inner.factory)()
    }

    /// Take a value wrapped in a guard that releases it on drop
    pub fn acquire(&self) -> Pooled<T> {
        Pooled {
            value: Some(self.get()),
            pool: self.clone(),
        }
    }

    /// Reset `value` and put it back on the idle list
    ///
    /// The value is dropped if its reset fails or the idle list is full.
    /// Returns whether it was kept.
    pub fn release(&self, mut value: T) -> bool {
        if let Err(e) = value.reset() {
            self.inner.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(pool = %self.inner.name, error = %e, "Dropping value that failed to reset");
            return false;
        }

        if !self.inner.reserve_slot() {
            self.inner.discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.inner.idle.push(value);
        self.inner.released.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Create idle values until `min_size` are idle
    ///
    /// Returns the number of values created.
    pub fn refill(&self) -> usize {
        let mut created = 0;
        while self.idle() < self.inner.min_size && self.inner.reserve_slot() {
            self.inner.idle.push((self.inner.factory)());
            self.inner.created.fetch_add(1, Ordering::Relaxed);
            created += 1;
        }
        created
    }
}

impl<T> ObjectPool<T> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Values currently idle
    #[must_use]
    pub fn idle(&self) -> usize {
        self.inner.idle_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn min_size(&self) -> usize {
        self.inner.min_size
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Drop idle values until at most `target` remain
    ///
    /// Returns the number of values dropped.
    pub fn trim_to(&self, target: usize) -> usize {
        let mut removed = 0;
        while self.idle() > target {
            match self.inner.pop_idle() {
                Some(value) => {
                    drop(value);
                    removed += 1;
                }
                None => break,
            }
        }
        if removed > 0 {
            self.inner
                .discarded
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(pool = %self.inner.name, removed, target, "Trimmed object pool");
        }
        removed
    }

    /// Drop idle values down to `min_size`
    pub fn shrink_to_min(&self) -> usize {
        self.trim_to(self.inner.min_size)
    }

    /// Drop half of the idle values above `min_size`
    pub fn trim_surplus(&self) -> usize {
        let min_size = self.inner.min_size;
        let idle = self.idle();
        if idle <= min_size {
            return 0;
        }
        self.trim_to(min_size + (idle - min_size) / 2)
    }

    #[must_use]
    pub fn stats(&self) -> ObjectPoolStats {
        ObjectPoolStats {
            name: self.inner.name.clone(),
            idle: self.idle(),
            min_size: self.inner.min_size,
            max_size: self.inner.max_size,
            created: self.inner.created.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
        }
    }
}

/// A value borrowed from an [`ObjectPool`]
///
/// Dropping the guard releases the value back to its pool.
pub struct Pooled<T: Resettable + Send + 'static> {
    value: Option<T>,
    pool: ObjectPool<T>,
}

impl<T: Resettable + Send + 'static> Pooled<T> {
    /// Keep the value instead of returning it to the pool
    #[must_use]
    pub fn into_inner(mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("pooled value taken twice"),
        }
    }
}

impl<T: Resettable + Send + 'static> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value used after release"),
        }
    }
}

impl<T: Resettable + Send + 'static> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value used after release"),
        }
    }
}

impl<T: Resettable + Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

/// Snapshot of one object pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPoolStats {
    pub name: String,
    pub idle: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub created: u64,
    pub reused: u64,
    pub released: u64,
    pub discarded: u64,
}

impl EmitMetrics for ObjectPoolStats {
    fn emit(&self, sink: &dyn MetricsSink) {
        let tags = [("pool", self.name.as_str())];
        sink.record("object_pool.idle", self.idle as f64, &tags);
        sink.record("object_pool.created", self.created as f64, &tags);
        sink.record("object_pool.reused", self.reused as f64, &tags);
        sink.record("object_pool.released", self.released as f64, &tags);
        sink.record("object_pool.discarded", self.discarded as f64, &tags);
    }
}

/// Type-erased view of an object pool used by the memory manager
pub trait ManagedPool: Send + Sync {
    fn name(&self) -> &str;
    fn idle(&self) -> usize;
    fn trim_surplus(&self) -> usize;
    fn shrink_to_min(&self) -> usize;
    fn stats(&self) -> ObjectPoolStats;
}

impl<T: Send + 'static> ManagedPool for ObjectPool<T> {
    fn name(&self) -> &str {
        ObjectPool::name(self)
    }

    fn idle(&self) -> usize {
        ObjectPool::idle(self)
    }

    fn trim_surplus(&self) -> usize {
        ObjectPool::trim_surplus(self)
    }

    fn shrink_to_min(&self) -> usize {
        ObjectPool::shrink_to_min(self)
    }

    fn stats(&self) -> ObjectPoolStats {
        ObjectPool::stats(self)
    }
}
