use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use super::{usage_percent, Sampler, BYTES_PER_MB};
use crate::error::{ObserverError, Result};
use crate::log_entry::{category, LogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

pub trait MemorySource: Send {
    fn memory(&mut self) -> Result<MemoryInfo>;
}

pub struct SystemMemory {
    system: System,
}

impl SystemMemory {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_memory(MemoryRefreshKind::everything());
        Self {
            system: System::new_with_specifics(refresh_kind),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for SystemMemory {
    fn memory(&mut self) -> Result<MemoryInfo> {
        self.system.refresh_memory();
        Ok(MemoryInfo {
            total_bytes: self.system.total_memory(),
            available_bytes: self.system.available_memory(),
        })
    }
}

pub struct MemorySampler<M> {
    source: M,
    warn_percent: u64,
}

impl<M: MemorySource> MemorySampler<M> {
    pub fn new(source: M, warn_percent: u64) -> Self {
        Self {
            source,
            warn_percent,
        }
    }
}

impl<M: MemorySource> Sampler for MemorySampler<M> {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn sample(&mut self) -> Result<Vec<LogEntry>> {
        let info = self.source.memory()?;
        let total_mb = info.total_bytes / BYTES_PER_MB;
        let used_mb = info.total_bytes.saturating_sub(info.available_bytes) / BYTES_PER_MB;
        let percent = usage_percent(used_mb, total_mb)
            .ok_or_else(|| ObserverError::Sampler("total memory reported as 0".to_string()))?;

        let mut message = format!(
            "Memory used: {} MB of {} MB ({}%)",
            used_mb, total_mb, percent
        );
        let over = percent > self.warn_percent;
        if over {
            message.push_str(&format!(" - ALERT: usage above {}%!", self.warn_percent));
        }

        let mut entries = vec![LogEntry::new(category::MEMORY_USAGE, message)];
        if over {
            entries.push(LogEntry::new(
                category::WARNING,
                format!("Memory usage above {}%", self.warn_percent),
            ));
        }
        Ok(entries)
    }

    fn failure_entry(&self, _err: &ObserverError) -> LogEntry {
        LogEntry::new(category::MEMORY_USAGE, "Failed to read memory usage")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(MemoryInfo);

    impl MemorySource for Fixed {
        fn memory(&mut self) -> Result<MemoryInfo> {
            Ok(self.0)
        }
    }

    fn sampler(total_mb: u64, used_mb: u64) -> MemorySampler<Fixed> {
        MemorySampler::new(
            Fixed(MemoryInfo {
                total_bytes: total_mb * BYTES_PER_MB,
                available_bytes: (total_mb - used_mb) * BYTES_PER_MB,
            }),
            80,
        )
    }

    #[test]
    fn normal_usage_yields_single_entry() {
        let entries = sampler(1000, 500).sample().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, category::MEMORY_USAGE);
        assert_eq!(entries[0].message, "Memory used: 500 MB of 1000 MB (50%)");
    }

    #[test]
    fn percentage_is_truncated() {
        let entries = sampler(1000, 849).sample().unwrap();
        assert_eq!(entries[0].message, "Memory used: 849 MB of 1000 MB (84%)");
    }

    #[test]
    fn exactly_at_threshold_is_not_a_warning() {
        let entries = sampler(100, 80).sample().unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn above_threshold_adds_alert_and_warning() {
        let entries = sampler(100, 85).sample().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].message,
            "Memory used: 85 MB of 100 MB (85%) - ALERT: usage above 80%!"
        );
        assert_eq!(entries[1].category, category::WARNING);
        assert_eq!(entries[1].message, "Memory usage above 80%");
    }

    #[test]
    fn zero_total_is_an_error() {
        let mut sampler = MemorySampler::new(
            Fixed(MemoryInfo {
                total_bytes: 0,
                available_bytes: 0,
            }),
            80,
        );
        assert!(sampler.sample().is_err());
    }
}
