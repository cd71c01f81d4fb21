//! Tracking registry for shared objects
//!
//! Objects are registered through a weak reference and a reclaim callback.
//! Handles carry a generation so a stale handle can never untrack the object
//! that later reused its slot. A sweep fires the callback of every object
//! whose last strong reference is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Key of one tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    index: usize,
    generation: u64,
}

type ReclaimCallback = Box<dyn FnOnce() + Send>;

struct Tracked {
    type_name: &'static str,
    alive: Box<dyn Fn() -> bool + Send>,
    on_reclaim: ReclaimCallback,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    entry: Option<Tracked>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

/// Registry of weakly referenced objects
#[derive(Default)]
pub struct TrackingRegistry {
    slots: Mutex<Slots>,
}

impl std::fmt::Debug for TrackingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl TrackingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `object`; `on_reclaim` runs on the sweep after it is dropped
    pub fn track<T, F>(&self, object: &Arc<T>, on_reclaim: F) -> TrackHandle
    where
        T: Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        let weak: Weak<T> = Arc::downgrade(object);
        let entry = Tracked {
            type_name: std::any::type_name::<T>(),
            alive: Box::new(move || weak.strong_count() > 0),
            on_reclaim: Box::new(on_reclaim),
        };

        let mut slots = self.lock();
        slots.live += 1;
        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                slots.slots.push(Slot::default());
                slots.slots.len() - 1
            }
        };
        let slot = &mut slots.slots[index];
        slot.entry = Some(entry);
        TrackHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Stop tracking without running the reclaim callback
    ///
    /// Returns `false` for unknown or stale handles.
    pub fn untrack(&self, handle: TrackHandle) -> bool {
        let mut slots = self.lock();
        let removed = match slots.slots.get_mut(handle.index) {
            Some(slot) if slot.generation == handle.generation && slot.entry.is_some() => {
                slot.entry = None;
                slot.generation += 1;
                true
            }
            _ => false,
        };
        if removed {
            slots.live -= 1;
            slots.free.push(handle.index);
        }
        removed
    }

    /// Whether `handle` still refers to a live registration
    #[must_use]
    pub fn contains(&self, handle: TrackHandle) -> bool {
        self.lock()
            .slots
            .get(handle.index)
            .is_some_and(|slot| slot.generation == handle.generation && slot.entry.is_some())
    }

    /// Remove dropped objects and run their reclaim callbacks
    ///
    /// Callbacks run after the registry lock is released. Returns the number
    /// of objects reclaimed.
    pub fn sweep(&self) -> usize {
        let callbacks: Vec<ReclaimCallback> = {
            let mut guard = self.lock();
            let slots = &mut *guard;
            let mut callbacks = Vec::new();
            for (index, slot) in slots.slots.iter_mut().enumerate() {
                let dead = slot.entry.as_ref().is_some_and(|entry| !(entry.alive)());
                if !dead {
                    continue;
                }
                if let Some(entry) = slot.entry.take() {
                    callbacks.push(entry.on_reclaim);
                }
                slot.generation += 1;
                slots.free.push(index);
            }
            slots.live -= callbacks.len();
            callbacks
        };

        let reclaimed = callbacks.len();
        for callback in callbacks {
            callback();
        }
        reclaimed
    }

    /// Live registrations per type, largest first
    #[must_use]
    pub fn counts_by_type(&self) -> Vec<(&'static str, usize)> {
        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for entry in self.lock().slots.iter().filter_map(|s| s.entry.as_ref()) {
            *counts.entry(entry.type_name).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        counts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
