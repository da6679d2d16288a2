use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::UpsertPolicy;

const DEFAULT_CONFIG_PATH: &str = "./observer.toml";

#[derive(Parser, Debug)]
#[clap(name = "device-observer", version, about)]
pub struct Cli {
    /// Path to configuration file
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override latency probe URL
    #[clap(long)]
    pub probe_url: Option<String>,

    /// Override sampling period in milliseconds
    #[clap(long)]
    pub period_ms: Option<u64>,

    /// Override maximum number of live entries
    #[clap(long)]
    pub capacity: Option<usize>,

    /// Append every accepted entry to this JSON-lines journal
    #[clap(long)]
    pub journal: Option<PathBuf>,

    /// Override log level (error, warn, info, debug, trace)
    #[clap(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub period_ms: u64,
    pub capacity: usize,
    pub probe_url: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub fast_threshold_ms: u64,
    pub memory_warn_percent: u64,
    pub storage_warn_percent: u64,
    pub data_dir: PathBuf,
    pub app_dirs: Vec<PathBuf>,
    pub cache_dirs: Vec<PathBuf>,
    pub journal_path: Option<PathBuf>,
    pub fixed_categories: Vec<String>,
    pub promote_on_update: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_ms: 5000,
            capacity: 20,
            probe_url: "https://www.google.com".to_string(),
            connect_timeout_ms: 3000,
            read_timeout_ms: 3000,
            fast_threshold_ms: 300,
            memory_warn_percent: 80,
            storage_warn_percent: 90,
            data_dir: PathBuf::from("/"),
            app_dirs: Vec::new(),
            cache_dirs: Vec::new(),
            journal_path: None,
            fixed_categories: Vec::new(),
            promote_on_update: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn upsert_policy(&self) -> UpsertPolicy {
        UpsertPolicy {
            promote_on_update: self.promote_on_update,
            fixed_categories: self.fixed_categories.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            anyhow::bail!("capacity must be at least 1");
        }
        if self.period_ms == 0 {
            anyhow::bail!("period_ms must be greater than 0");
        }
        if self.probe_url.is_empty() {
            anyhow::bail!("probe_url must not be empty");
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).context("Failed to parse config file")
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        let config_content = fs::read_to_string(&cli.config)
            .with_context(|| format!("Failed to read config file: {:?}", cli.config))?;
        parse_config(&config_content)?
    } else if cli.config == PathBuf::from(DEFAULT_CONFIG_PATH) {
        Config::default()
    } else {
        anyhow::bail!("Config file not found: {:?}", cli.config);
    };

    // Apply CLI overrides
    if let Some(ref probe_url) = cli.probe_url {
        config.probe_url = probe_url.clone();
    }

    if let Some(period_ms) = cli.period_ms {
        config.period_ms = period_ms;
    }

    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }

    if let Some(ref journal) = cli.journal {
        config.journal_path = Some(journal.clone());
    }

    if let Some(ref log_level) = cli.log_level {
        config.log_level = log_level.clone();
    }

    config.validate()?;
    Ok(config)
}
