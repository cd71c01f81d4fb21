//! Object pooling and memory supervision

mod manager;
mod object_pool;
mod sampler;
mod tracking;

pub use manager::{CollectionReport, MemoryManager, MemoryPressure, MemoryStats};
pub use object_pool::{ManagedPool, ObjectPool, ObjectPoolStats, Pooled, ResetError, Resettable};
pub use sampler::{MemorySample, MemorySampler, SysinfoSampler};
pub use tracking::{TrackHandle, TrackingRegistry};
