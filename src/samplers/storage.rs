//! Storage utilisation of the primary data volume.
//!
//! Two strategies exist. [`PackageAccounting`] sums the bytes held by the
//! configured application and cache directories; it is only available when
//! application directories are configured and present. [`BlockDevice`]
//! reads free/total space of the volume and adds cache directory sizes to
//! the used figure. The sampler probes the preferred strategy on every call
//! and falls back to the block-device one when it is unavailable or fails.

use log::{debug, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

use super::{usage_percent, Sampler, BYTES_PER_GB};
use crate::error::{ObserverError, Result};
use crate::log_entry::{category, LogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSpace {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

pub trait VolumeSource: Send {
    fn space(&mut self) -> Result<VolumeSpace>;
}

/// The mounted volume holding `path`, resolved through `sysinfo`.
pub struct DiskVolume {
    disks: Disks,
    path: PathBuf,
}

impl DiskVolume {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
            path: path.into(),
        }
    }
}

impl VolumeSource for DiskVolume {
    fn space(&mut self) -> Result<VolumeSpace> {
        self.disks.refresh(true);

        // Longest mount point that prefixes the path wins.
        let disk = self
            .disks
            .list()
            .iter()
            .filter(|d| self.path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| {
                ObserverError::Storage(format!("no volume mounted for {}", self.path.display()))
            })?;

        Ok(VolumeSpace {
            total_bytes: disk.total_space(),
            available_bytes: disk.available_space(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// Cache directory sizes were added on top of block-level usage.
    pub includes_cache: bool,
}

pub trait StorageStrategy: Send {
    fn category(&self) -> &'static str;

    /// Short name used in log lines and warnings.
    fn label(&self) -> &'static str;

    /// Capability probe, evaluated before every measurement.
    fn is_available(&self) -> bool {
        true
    }

    fn measure(&mut self) -> Result<StorageInfo>;
}

/// Recursive size of regular files below `path`. Symlinks are not followed.
pub fn dir_size(path: &Path) -> Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_file() {
        return Ok(meta.len());
    }
    if !meta.is_dir() {
        return Ok(0);
    }

    let mut size = 0;
    for entry in fs::read_dir(path)? {
        size += dir_size(&entry?.path())?;
    }
    Ok(size)
}

/// Missing cache directories count as empty.
fn cache_size(dirs: &[PathBuf]) -> Result<u64> {
    let mut total = 0;
    for dir in dirs {
        match dir_size(dir) {
            Ok(size) => total += size,
            Err(ObserverError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

pub struct PackageAccounting<V> {
    volume: V,
    app_dirs: Vec<PathBuf>,
    cache_dirs: Vec<PathBuf>,
}

impl<V: VolumeSource> PackageAccounting<V> {
    pub fn new(volume: V, app_dirs: Vec<PathBuf>, cache_dirs: Vec<PathBuf>) -> Self {
        Self {
            volume,
            app_dirs,
            cache_dirs,
        }
    }
}

impl<V: VolumeSource> StorageStrategy for PackageAccounting<V> {
    fn category(&self) -> &'static str {
        category::STORAGE_STATS
    }

    fn label(&self) -> &'static str {
        "package accounting"
    }

    fn is_available(&self) -> bool {
        !self.app_dirs.is_empty() && self.app_dirs.iter().all(|d| d.is_dir())
    }

    fn measure(&mut self) -> Result<StorageInfo> {
        let total = self.volume.space()?.total_bytes;

        let mut app_bytes = 0;
        for dir in &self.app_dirs {
            app_bytes += dir_size(dir)?;
        }
        let used = app_bytes + cache_size(&self.cache_dirs)?;

        if used > total {
            return Err(ObserverError::Storage(format!(
                "accounted {} bytes exceed volume size {}",
                used, total
            )));
        }

        Ok(StorageInfo {
            total_bytes: total,
            used_bytes: used,
            free_bytes: total - used,
            includes_cache: false,
        })
    }
}

pub struct BlockDevice<V> {
    volume: V,
    cache_dirs: Vec<PathBuf>,
}

impl<V: VolumeSource> BlockDevice<V> {
    pub fn new(volume: V, cache_dirs: Vec<PathBuf>) -> Self {
        Self { volume, cache_dirs }
    }
}

impl<V: VolumeSource> StorageStrategy for BlockDevice<V> {
    fn category(&self) -> &'static str {
        category::STORAGE_LEGACY
    }

    fn label(&self) -> &'static str {
        "block device"
    }

    fn measure(&mut self) -> Result<StorageInfo> {
        let space = self.volume.space()?;
        let used = space.total_bytes.saturating_sub(space.available_bytes)
            + cache_size(&self.cache_dirs)?;

        Ok(StorageInfo {
            total_bytes: space.total_bytes,
            used_bytes: used,
            free_bytes: space.available_bytes,
            includes_cache: !self.cache_dirs.is_empty(),
        })
    }
}

fn gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

fn format_storage(info: &StorageInfo, percent: u64) -> String {
    let cache_note = if info.includes_cache { " (includes cache)" } else { "" };
    format!(
        "Total: {:.2} GB, Used: {:.2} GB{}, Free: {:.2} GB ({}%)",
        gb(info.total_bytes),
        gb(info.used_bytes),
        cache_note,
        gb(info.free_bytes),
        percent
    )
}

pub struct StorageSampler {
    preferred: Option<Box<dyn StorageStrategy>>,
    legacy: Box<dyn StorageStrategy>,
    warn_percent: u64,
    /// Category of the last successful reading; failures overwrite it.
    last_category: &'static str,
}

impl StorageSampler {
    pub fn new(legacy: impl StorageStrategy + 'static, warn_percent: u64) -> Self {
        let last_category = legacy.category();
        Self {
            preferred: None,
            legacy: Box::new(legacy),
            warn_percent,
            last_category,
        }
    }

    pub fn with_preferred(mut self, strategy: impl StorageStrategy + 'static) -> Self {
        self.preferred = Some(Box::new(strategy));
        self
    }

    fn measure(&mut self) -> Result<(&'static str, &'static str, StorageInfo)> {
        if let Some(preferred) = self.preferred.as_mut() {
            if preferred.is_available() {
                match preferred.measure() {
                    Ok(info) => return Ok((preferred.category(), preferred.label(), info)),
                    Err(e) => warn!(
                        "{} storage measurement failed, falling back: {}",
                        preferred.label(),
                        e
                    ),
                }
            } else {
                debug!("{} storage strategy unavailable", preferred.label());
            }
        }

        let info = self.legacy.measure()?;
        Ok((self.legacy.category(), self.legacy.label(), info))
    }
}

impl Sampler for StorageSampler {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn sample(&mut self) -> Result<Vec<LogEntry>> {
        let (category, label, info) = self.measure()?;
        let percent = usage_percent(info.used_bytes, info.total_bytes)
            .ok_or_else(|| ObserverError::Storage("volume size reported as 0".to_string()))?;

        self.last_category = category;
        let mut entries = vec![LogEntry::new(category, format_storage(&info, percent))];
        if percent > self.warn_percent {
            entries.push(LogEntry::new(
                category::WARNING,
                format!("Storage usage above {}% ({})", self.warn_percent, label),
            ));
        }
        Ok(entries)
    }

    fn failure_entry(&self, _err: &ObserverError) -> LogEntry {
        LogEntry::new(self.last_category, "Failed to read storage statistics")
    }
}
