//! `device-observer` library crate.
//!
//! Samples device health signals on a fixed period and keeps the latest
//! status line per category in a bounded [`store::LogStore`]. The binary
//! entry point lives in `main.rs`.

pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod log_entry;
pub mod samplers;
pub mod scheduler;
pub mod sink;
pub mod store;

pub use log_entry::LogEntry;
pub use store::{LogStore, Snapshot, SubscriptionId, UpsertPolicy};
