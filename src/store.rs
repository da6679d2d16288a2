//! Bounded, category-deduplicated log with snapshot publication.
//!
//! [`LogStore`] keeps at most one live entry per category. A new category
//! is pushed to the front; an entry for a category already present replaces
//! it in place, so frequently refreshed lines keep their position. When the
//! sequence grows past capacity the tail is evicted.
//!
//! Every accepted change publishes an immutable [`Snapshot`] while the write
//! lock is still held, so concurrent inserts can never interleave their
//! publish steps. Updates are applied in lock-acquisition order; producer
//! timestamps are carried along but never compared.

use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{ObserverError, Result};
use crate::log_entry::LogEntry;
use crate::sink::SinkHandle;

/// Immutable, point-in-time copy of the store contents. Index 0 is the front.
pub type Snapshot = Arc<Vec<LogEntry>>;

type Subscriber = Box<dyn Fn(&Snapshot) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// How an entry for an already-present category is merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertPolicy {
    /// Move the updated entry to the front instead of replacing it in place.
    pub promote_on_update: bool,
    /// Categories written once and never overwritten afterwards.
    pub fixed_categories: Vec<String>,
}

impl UpsertPolicy {
    fn is_fixed(&self, category: &str) -> bool {
        self.fixed_categories.iter().any(|c| c == category)
    }
}

struct Inner {
    entries: VecDeque<LogEntry>,
    next_id: u64,
    next_subscription: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

pub struct LogStore {
    capacity: usize,
    policy: UpsertPolicy,
    inner: Mutex<Inner>,
    published: watch::Sender<Snapshot>,
    sink: Option<SinkHandle>,
    persistence_enabled: AtomicBool,
}

impl LogStore {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, UpsertPolicy::default())
    }

    pub fn with_policy(capacity: usize, policy: UpsertPolicy) -> Self {
        let (published, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            capacity,
            policy,
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity + 1),
                next_id: 1,
                next_subscription: 1,
                subscribers: Vec::new(),
            }),
            published,
            sink: None,
            persistence_enabled: AtomicBool::new(false),
        }
    }

    /// Attaches a persistence sink and enables forwarding to it.
    pub fn with_sink(mut self, sink: SinkHandle) -> Self {
        self.sink = Some(sink);
        self.persistence_enabled.store(true, Ordering::Relaxed);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Has no effect when no sink is attached.
    pub fn set_persistence_enabled(&self, enabled: bool) {
        self.persistence_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Upserts `entry` by category and publishes the result.
    ///
    /// Entries with an empty category and updates to a fixed category are
    /// dropped without publishing.
    pub fn insert(&self, entry: LogEntry) {
        if entry.category.is_empty() {
            warn!("Rejecting log entry with empty category: {}", entry.message);
            return;
        }

        let accepted = {
            let mut inner = self.inner.lock();
            let Some(accepted) = self.apply(&mut inner, entry) else {
                return;
            };

            let snapshot: Snapshot = Arc::new(inner.entries.iter().cloned().collect());
            self.published.send_replace(Arc::clone(&snapshot));

            let mut panicked = Vec::new();
            for (id, subscriber) in &inner.subscribers {
                if panic::catch_unwind(AssertUnwindSafe(|| subscriber(&snapshot))).is_err() {
                    error!("Subscriber {:?} panicked, removing it", id);
                    panicked.push(*id);
                }
            }
            if !panicked.is_empty() {
                inner.subscribers.retain(|(id, _)| !panicked.contains(id));
            }
            trace!("Published snapshot with {} entries", snapshot.len());
            accepted
        };

        if self.persistence_enabled.load(Ordering::Relaxed) {
            if let Some(ref sink) = self.sink {
                sink.forward(accepted);
            }
        }
    }

    fn apply(&self, inner: &mut Inner, mut entry: LogEntry) -> Option<LogEntry> {
        let existing = inner
            .entries
            .iter()
            .position(|e| e.category == entry.category);

        match existing {
            Some(index) => {
                if self.policy.is_fixed(&entry.category) {
                    trace!("Ignoring update to fixed category {}", entry.category);
                    return None;
                }

                entry.id = inner.next_id;
                inner.next_id += 1;
                debug!("Updating {} at index {}", entry.category, index);

                if self.policy.promote_on_update {
                    inner.entries.remove(index);
                    inner.entries.push_front(entry.clone());
                } else {
                    inner.entries[index] = entry.clone();
                }
            }
            None => {
                entry.id = inner.next_id;
                inner.next_id += 1;
                debug!("Adding new category {}", entry.category);
                inner.entries.push_front(entry.clone());

                while inner.entries.len() > self.capacity {
                    if let Some(evicted) = inner.entries.pop_back() {
                        debug!("Capacity reached, evicting {}", evicted.category);
                    }
                }
            }
        }

        Some(entry)
    }

    /// Returns the most recently published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.published.borrow())
    }

    /// Async view of published snapshots.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.published.subscribe()
    }

    /// Registers a callback invoked synchronously, in registration order,
    /// with every published snapshot.
    ///
    /// The callback runs while the store's write lock is held and must not
    /// call back into the store. A callback that panics is removed.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sub, _)| *sub != id);
        inner.subscribers.len() != before
    }

    /// Most recently persisted entries, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<LogEntry>> {
        match self.sink {
            Some(ref sink) => sink.recent(limit),
            None => Err(ObserverError::Unavailable("no journal attached".to_string())),
        }
    }
}
