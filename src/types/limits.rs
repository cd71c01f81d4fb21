//! Size and limit configuration types

use std::num::{NonZeroU32, NonZeroUsize};

nonzero_newtype! {
    /// A non-zero maximum pool size
    ///
    /// Ensures connection and object pools always allow at least one entry.
    ///
    /// # Examples
    /// ```
    /// use swarm_perf::types::MaxPoolSize;
    ///
    /// let max = MaxPoolSize::new(10).unwrap();
    /// assert_eq!(max.get(), 10);
    ///
    /// // Zero-sized pools are invalid
    /// assert!(MaxPoolSize::new(0).is_none());
    /// ```
    #[doc(alias = "max_size")]
    pub struct MaxPoolSize(NonZeroUsize: usize, serialize as serialize_u64);
}

impl MaxPoolSize {
    /// Default maximum connections per pool
    pub const DEFAULT: Self = Self(NonZeroUsize::new(10).unwrap());
}

nonzero_newtype! {
    /// A non-zero maximum number of messages per batch
    pub struct BatchSize(NonZeroUsize: usize, serialize as serialize_u64);
}

impl BatchSize {
    /// Default maximum batch size
    pub const DEFAULT: Self = Self(NonZeroUsize::new(100).unwrap());
}

nonzero_newtype! {
    /// A non-zero semaphore limit
    ///
    /// Named semaphores are never shrunk below one permit.
    pub struct SemaphoreLimit(NonZeroUsize: usize, serialize as serialize_u64);
}

impl SemaphoreLimit {
    /// Default limit for semaphores created without an explicit value
    pub const DEFAULT: Self = Self(NonZeroUsize::new(10).unwrap());

    /// Clamp an arbitrary requested limit to a valid one (minimum 1)
    #[must_use]
    pub const fn clamped(value: usize) -> Self {
        match NonZeroUsize::new(value) {
            Some(nz) => Self(nz),
            None => Self(NonZeroUsize::MIN),
        }
    }
}

nonzero_newtype! {
    /// A non-zero number of attempts for retried operations
    pub struct AttemptCount(NonZeroU32: u32, serialize as serialize_u32);
}

impl AttemptCount {
    /// Default number of attempts
    pub const DEFAULT: Self = Self(NonZeroU32::new(3).unwrap());
}
