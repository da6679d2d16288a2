use chrono::{DateTime, Local, Utc};
use tokio::sync::watch;

use crate::log_entry::LogEntry;
use crate::store::Snapshot;

fn format_time(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

pub fn render_snapshot(entries: &[LogEntry]) -> String {
    let mut out = format!("---- {} entries ----\n", entries.len());
    for entry in entries {
        out.push_str(&format!(
            "{}  {:<14} {}\n",
            format_time(entry.timestamp),
            entry.category,
            entry.message
        ));
    }
    out
}

/// Prints every snapshot published after the call until the store goes away.
pub async fn run_renderer(mut rx: watch::Receiver<Snapshot>) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        print!("{}", render_snapshot(&snapshot));
    }
}
