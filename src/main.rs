use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use device_observer::commands::{self, Command};
use device_observer::config::{self, Config};
use device_observer::console;
use device_observer::log_entry::{category, LogEntry};
use device_observer::samplers::{
    BlockDevice, ConnectivitySampler, DataUsageSampler, DiskVolume, InterfaceConnectivity,
    InterfaceTraffic, LatencyProbe, MemorySampler, PackageAccounting, StorageSampler,
    SystemMemory,
};
use device_observer::scheduler::Scheduler;
use device_observer::sink::{JsonlSink, SinkHandle};
use device_observer::store::LogStore;

fn init_logging(level: &str) -> Result<()> {
    let level: LevelFilter = level
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid log level: {}", level))?;
    SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
        .context("Failed to initialise logger")
}

fn build_scheduler(config: &Config, store: Arc<LogStore>) -> Result<Scheduler> {
    let storage = StorageSampler::new(
        BlockDevice::new(DiskVolume::new(&config.data_dir), config.cache_dirs.clone()),
        config.storage_warn_percent,
    )
    .with_preferred(PackageAccounting::new(
        DiskVolume::new(&config.data_dir),
        config.app_dirs.clone(),
        config.cache_dirs.clone(),
    ));

    let probe = LatencyProbe::new(
        config.probe_url.clone(),
        config.connect_timeout(),
        config.read_timeout(),
        config.fast_threshold_ms,
    )
    .context("Failed to build latency probe client")?;

    Ok(Scheduler::new(store, config.period())
        .with_sampler(ConnectivitySampler::new(InterfaceConnectivity::new()))
        .with_sampler(DataUsageSampler::new(InterfaceTraffic::new()))
        .with_sampler(MemorySampler::new(SystemMemory::new(), config.memory_warn_percent))
        .with_sampler(storage)
        .with_latency_probe(probe))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let config = config::load_config(&cli)?;
    init_logging(&config.log_level)?;

    info!("Starting device-observer");

    let mut store = LogStore::with_policy(config.capacity, config.upsert_policy());
    let sink_worker = match config.journal_path {
        Some(ref path) => {
            let sink = JsonlSink::open(path)
                .with_context(|| format!("Failed to open journal: {:?}", path))?;
            info!("Persisting entries to {:?}", sink.path());
            let (handle, worker) = SinkHandle::spawn(Arc::new(sink));
            store = store.with_sink(handle);
            Some(worker)
        }
        None => None,
    };
    let store = Arc::new(store);

    let renderer = tokio::spawn(console::run_renderer(store.watch()));

    store.insert(LogEntry::new(category::INFO, "Application started"));
    store.insert(LogEntry::new(category::DEBUG, "Monitoring started"));

    let scheduler = build_scheduler(&config, Arc::clone(&store))?.spawn();
    info!("Sampling every {:?}", config.period());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match commands::parse_command(&line) {
                            Ok(Command::Quit) => break,
                            Ok(cmd) => commands::execute_command(cmd, &store, &scheduler),
                            Err(e) => warn!("{}", e),
                        }
                    }
                    // Stdin closed: keep sampling until interrupted.
                    Ok(None) => {
                        if let Err(e) = tokio::signal::ctrl_c().await {
                            error!("Failed to listen for Ctrl-C: {}", e);
                        }
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down");
    scheduler.shutdown().await;
    drop(store);

    if let Some(worker) = sink_worker {
        if let Err(e) = worker.await {
            error!("Persistence worker failed: {}", e);
        }
    }
    if let Err(e) = renderer.await {
        error!("Renderer task failed: {}", e);
    }

    Ok(())
}
