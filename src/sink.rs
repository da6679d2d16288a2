//! Optional durable sink for accepted entries.
//!
//! The store never waits on persistence: entries are pushed onto an
//! unbounded channel and a worker task hands them to the sink one at a time
//! on the blocking pool. Failures are logged and the entry is dropped.

use log::{error, trace, warn};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ObserverError, Result};
use crate::log_entry::LogEntry;

pub trait PersistenceSink: Send + Sync + 'static {
    fn put(&self, entry: &LogEntry) -> Result<()>;

    /// Up to `limit` persisted entries, most recently written first.
    fn recent(&self, _limit: usize) -> Result<Vec<LogEntry>> {
        Err(ObserverError::Unavailable("sink cannot be read back".to_string()))
    }
}

/// Appends one JSON object per line.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceSink for JsonlSink {
    fn put(&self, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        // Holding the writer lock keeps a half-written line out of the read.
        let _writer = self.file.lock();
        read_journal(&self.path, limit)
    }
}

/// Reads a journal written by [`JsonlSink`], most recently appended first.
///
/// Lines that fail to parse are skipped.
pub fn read_journal(path: impl AsRef<Path>, limit: usize) -> Result<Vec<LogEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping malformed journal line: {}", e),
        }
    }
    entries.reverse();
    entries.truncate(limit);
    Ok(entries)
}

/// Fire-and-forget handle the store uses to reach the sink worker.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<LogEntry>,
    sink: Arc<dyn PersistenceSink>,
}

impl SinkHandle {
    /// Spawns the forwarding worker. Must be called inside a Tokio runtime.
    ///
    /// The worker exits once every handle has been dropped and the queue
    /// is drained.
    pub fn spawn(sink: Arc<dyn PersistenceSink>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogEntry>();
        let reader = Arc::clone(&sink);

        let worker = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let sink = Arc::clone(&sink);
                let category = entry.category.clone();
                match tokio::task::spawn_blocking(move || sink.put(&entry)).await {
                    Ok(Ok(())) => trace!("Persisted {} entry", category),
                    Ok(Err(e)) => error!("Failed to persist {} entry: {}", category, e),
                    Err(e) => error!("Persistence task for {} entry aborted: {}", category, e),
                }
            }
        });

        (Self { tx, sink: reader }, worker)
    }

    /// Reads back from the sink. Entries still queued are not included.
    pub fn recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.sink.recent(limit)
    }

    pub fn forward(&self, entry: LogEntry) {
        if self.tx.send(entry).is_err() {
            warn!("Persistence worker stopped, dropping entry");
        }
    }
}
