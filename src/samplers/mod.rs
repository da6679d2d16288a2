//! Device signal samplers.
//!
//! Each sampler wraps one platform measurement and turns it into log
//! entries. Measurements sit behind small traits so the `sysinfo`-backed
//! implementations can be swapped for fixed values in tests.

mod connectivity;
mod data_usage;
pub mod latency;
mod memory;
mod storage;

pub use connectivity::{ConnectivityCheck, ConnectivitySampler, InterfaceConnectivity};
pub use data_usage::{DataUsageSampler, InterfaceTraffic, TrafficCounter};
pub use latency::{classify_latency, LatencyClass, LatencyProbe};
pub use memory::{MemoryInfo, MemorySampler, MemorySource, SystemMemory};
pub use storage::{
    dir_size, BlockDevice, DiskVolume, PackageAccounting, StorageInfo, StorageSampler,
    StorageStrategy, VolumeSource, VolumeSpace,
};

use crate::error::{ObserverError, Result};
use crate::log_entry::LogEntry;

pub const BYTES_PER_MB: u64 = 1024 * 1024;
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A synchronous producer driven by the scheduler.
pub trait Sampler: Send {
    fn name(&self) -> &'static str;

    /// Takes one measurement. May yield more than one entry when a
    /// threshold warning accompanies the reading.
    fn sample(&mut self) -> Result<Vec<LogEntry>>;

    /// Degraded entry shown in place of a reading when `sample` fails.
    fn failure_entry(&self, err: &ObserverError) -> LogEntry;
}

/// `used * 100 / total` with integer truncation. `None` when `total` is 0.
pub fn usage_percent(used: u64, total: u64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    Some(used.saturating_mul(100) / total)
}
