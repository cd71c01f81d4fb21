//! Memory sampling
//!
//! The monitor reads memory through [`MemorySampler`] so tests can script
//! pressure. [`SysinfoSampler`] reads the real system and process figures.

use anyhow::{Result, anyhow};
use std::sync::{Mutex, PoisonError};
use sysinfo::{MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

/// One memory reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemorySample {
    /// System memory in use, in bytes
    pub used_bytes: u64,
    /// Total system memory, in bytes
    pub total_bytes: u64,
    /// Resident set size of this process, in bytes
    pub process_bytes: u64,
}

impl MemorySample {
    /// System memory usage as a percentage
    #[must_use]
    pub fn percent_used(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    /// Growth of process memory since `previous`, zero if it shrank
    #[must_use]
    pub fn growth_since(&self, previous: &MemorySample) -> u64 {
        self.process_bytes.saturating_sub(previous.process_bytes)
    }
}

/// Source of memory readings
pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> Result<MemorySample>;
}

/// Sampler backed by `sysinfo`
pub struct SysinfoSampler {
    system: Mutex<System>,
    pid: sysinfo::Pid,
}

impl std::fmt::Debug for SysinfoSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoSampler")
            .field("pid", &self.pid)
            .finish()
    }
}

impl SysinfoSampler {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("Failed to get current PID: {e}"))?;
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_memory(MemoryRefreshKind::nothing().with_ram())
                .with_processes(ProcessRefreshKind::nothing().with_memory()),
        );
        Ok(Self {
            system: Mutex::new(system),
            pid,
        })
    }
}

impl MemorySampler for SysinfoSampler {
    fn sample(&self) -> Result<MemorySample> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        let process_bytes = system
            .process(self.pid)
            .map(|p| p.memory())
            .ok_or_else(|| anyhow!("Process {} not found", self.pid))?;

        Ok(MemorySample {
            used_bytes: system.used_memory(),
            total_bytes: system.total_memory(),
            process_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_used() {
        let sample = MemorySample {
            used_bytes: 96,
            total_bytes: 100,
            process_bytes: 10,
        };
        assert!((sample.percent_used() - 96.0).abs() < f64::EPSILON);
        assert_eq!(MemorySample::default().percent_used(), 0.0);
    }

    #[test]
    fn test_growth_since() {
        let before = MemorySample {
            process_bytes: 100,
            ..Default::default()
        };
        let after = MemorySample {
            process_bytes: 250,
            ..Default::default()
        };
        assert_eq!(after.growth_since(&before), 150);
        assert_eq!(before.growth_since(&after), 0);
    }

    #[test]
    fn test_sysinfo_sampler_reads_process() {
        let sampler = SysinfoSampler::new().unwrap();
        let sample = sampler.sample().unwrap();
        assert!(sample.total_bytes > 0);
        assert!(sample.process_bytes > 0);
    }
}
