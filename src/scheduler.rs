//! Periodic sampling driver.
//!
//! Each tick hands the synchronous samplers to the blocking pool, where they
//! run in registration order, and dispatches a latency probe to its own task
//! without waiting for either. A tick that finds the previous sampler round
//! still running is skipped. The scheduler can be suspended and resumed;
//! while suspended the ticker is dropped entirely, so nothing is backlogged
//! and resuming ticks at once.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};

use crate::samplers::{LatencyProbe, Sampler};
use crate::store::LogStore;

type Samplers = Arc<Mutex<Vec<Box<dyn Sampler>>>>;

pub struct Scheduler {
    store: Arc<LogStore>,
    period: Duration,
    samplers: Samplers,
    latency: Option<LatencyProbe>,
}

impl Scheduler {
    pub fn new(store: Arc<LogStore>, period: Duration) -> Self {
        Self {
            store,
            period,
            samplers: Arc::new(Mutex::new(Vec::new())),
            latency: None,
        }
    }

    pub fn with_sampler(self, sampler: impl Sampler + 'static) -> Self {
        self.samplers.lock().push(Box::new(sampler));
        self
    }

    pub fn with_latency_probe(mut self, probe: LatencyProbe) -> Self {
        self.latency = Some(probe);
        self
    }

    /// Starts the driver in the active state. Must be called inside a Tokio
    /// runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let (active_tx, active_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(active_rx, shutdown_rx));

        SchedulerHandle {
            active_tx,
            shutdown_tx,
            task,
        }
    }

    fn tick(&self, rounds: &mut JoinSet<()>, probes: &mut JoinSet<()>) {
        debug!("Sampling tick");

        let samplers = Arc::clone(&self.samplers);
        let store = Arc::clone(&self.store);
        rounds.spawn_blocking(move || match samplers.try_lock() {
            Some(mut samplers) => sample_all(&store, &mut samplers),
            None => warn!("Previous sampling round still running, skipping tick"),
        });

        if let Some(ref probe) = self.latency {
            let probe = probe.clone();
            let store = Arc::clone(&self.store);
            probes.spawn(async move {
                let entry = probe.measure().await;
                store.insert(entry);
            });
        }
    }

    async fn run(
        self,
        mut active_rx: watch::Receiver<bool>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut rounds = JoinSet::new();
        let mut probes = JoinSet::new();
        info!("Scheduler started, period {:?}", self.period);

        'outer: loop {
            while !*active_rx.borrow_and_update() {
                tokio::select! {
                    changed = active_rx.changed() => {
                        if changed.is_err() {
                            break 'outer;
                        }
                    }
                    _ = shutdown_rx.changed() => break 'outer,
                }
            }

            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick(&mut rounds, &mut probes);
                    }
                    changed = active_rx.changed() => {
                        if changed.is_err() {
                            break 'outer;
                        }
                        if !*active_rx.borrow() {
                            info!("Scheduler suspended");
                            continue 'outer;
                        }
                    }
                    Some(result) = rounds.join_next() => {
                        if let Err(e) = result {
                            error!("Sampling round failed: {}", e);
                        }
                    }
                    Some(result) = probes.join_next() => {
                        if let Err(e) = result {
                            if e.is_panic() {
                                error!("Latency probe panicked: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break 'outer,
                }
            }
        }

        probes.shutdown().await;
        // A round already on the blocking pool cannot be aborted; let it finish.
        while let Some(result) = rounds.join_next().await {
            if let Err(e) = result {
                error!("Sampling round failed: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

/// Runs every sampler once. A failing sampler contributes its failure entry
/// and does not stop the ones after it.
fn sample_all(store: &LogStore, samplers: &mut [Box<dyn Sampler>]) {
    for sampler in samplers.iter_mut() {
        match sampler.sample() {
            Ok(entries) => {
                for entry in entries {
                    store.insert(entry);
                }
            }
            Err(e) => {
                warn!("{} sampler failed: {}", sampler.name(), e);
                store.insert(sampler.failure_entry(&e));
            }
        }
    }
}

/// Control handle for a spawned [`Scheduler`]. Dropping it stops the driver.
pub struct SchedulerHandle {
    active_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// No-op when already paused.
    pub fn pause(&self) {
        self.active_tx.send_if_modified(|active| std::mem::replace(active, false));
    }

    /// No-op when already running.
    pub fn resume(&self) {
        self.active_tx.send_if_modified(|active| !std::mem::replace(active, true));
    }

    pub fn is_active(&self) -> bool {
        *self.active_tx.borrow()
    }

    /// Stops the driver and aborts in-flight probes.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Scheduler task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ObserverError, Result};
    use crate::log_entry::{category, LogEntry};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Sampler for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        fn sample(&mut self) -> Result<Vec<LogEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order.lock().push(self.name);
            Ok(vec![LogEntry::new(self.name, "ok")])
        }

        fn failure_entry(&self, _err: &ObserverError) -> LogEntry {
            LogEntry::new(self.name, "failed")
        }
    }

    struct Failing;

    impl Sampler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn sample(&mut self) -> Result<Vec<LogEntry>> {
            Err(ObserverError::Sampler("permission denied".to_string()))
        }

        fn failure_entry(&self, _err: &ObserverError) -> LogEntry {
            LogEntry::new(category::MEMORY_USAGE, "Failed to read memory usage")
        }
    }

    fn counting(name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>) -> (Counting, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let sampler = Counting {
            name,
            calls: Arc::clone(&calls),
            order: Arc::clone(order),
        };
        (sampler, calls)
    }

    #[test]
    fn samplers_run_in_order_and_failures_are_isolated() {
        let store = Arc::new(LogStore::new(20));
        let order = Arc::new(Mutex::new(Vec::new()));
        let (first, _) = counting("FIRST", &order);
        let (last, last_calls) = counting("LAST", &order);

        let scheduler = Scheduler::new(Arc::clone(&store), Duration::from_secs(5))
            .with_sampler(first)
            .with_sampler(Failing)
            .with_sampler(last);
        sample_all(&store, &mut scheduler.samplers.lock());

        assert_eq!(*order.lock(), vec!["FIRST", "LAST"]);
        assert_eq!(last_calls.load(Ordering::SeqCst), 1);

        let snapshot = store.snapshot();
        let memory = snapshot
            .iter()
            .find(|e| e.category == category::MEMORY_USAGE)
            .unwrap();
        assert_eq!(memory.message, "Failed to read memory usage");
        assert_eq!(snapshot.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let store = Arc::new(LogStore::new(20));
        let order = Arc::new(Mutex::new(Vec::new()));
        let (sampler, calls) = counting("A", &order);

        let handle = Scheduler::new(store, Duration::from_millis(5000))
            .with_sampler(sampler)
            .spawn();

        tokio::time::sleep(Duration::from_millis(12_000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pause_suspends_without_backlog() {
        let store = Arc::new(LogStore::new(20));
        let order = Arc::new(Mutex::new(Vec::new()));
        let (sampler, calls) = counting("A", &order);

        let handle = Scheduler::new(store, Duration::from_millis(5000))
            .with_sampler(sampler)
            .spawn();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.pause();
        handle.pause();
        assert!(!handle.is_active());
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.resume();
        handle.resume();
        assert!(handle.is_active());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_subscriber_does_not_stop_sampling() {
        let store = Arc::new(LogStore::new(20));
        let delivered = Arc::new(AtomicUsize::new(0));
        store.subscribe(|_| panic!("consumer bug"));
        let counter = Arc::clone(&delivered);
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let order = Arc::new(Mutex::new(Vec::new()));
        let (sampler, calls) = counting("A", &order);
        let handle = Scheduler::new(Arc::clone(&store), Duration::from_millis(5000))
            .with_sampler(sampler)
            .spawn();

        tokio::time::sleep(Duration::from_millis(16_000)).await;
        handle.shutdown().await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(delivered.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn latency_probe_reports_through_the_store() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = Arc::new(LogStore::new(20));
        let mut rx = store.watch();
        let probe = LatencyProbe::new(
            format!("http://{}/", addr),
            Duration::from_millis(3000),
            Duration::from_millis(3000),
            300,
        )
        .unwrap();

        let handle = Scheduler::new(Arc::clone(&store), Duration::from_secs(60))
            .with_latency_probe(probe)
            .spawn();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot[0].category, category::LATENCY);

        handle.shutdown().await;
    }
}
