use anyhow::{Context, Result};
use log::{info, warn};

use crate::console;
use crate::log_entry::LogEntry;
use crate::scheduler::SchedulerHandle;
use crate::store::LogStore;

/// Operator commands read from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Quit,
    SetPersistence(bool),
    /// Print the last N journal entries.
    History(usize),
    /// Manual entry, subject to the same upsert policy as sampler output.
    Insert { category: String, message: String },
}

const DEFAULT_HISTORY: usize = 10;

/// Parses `/pause`, `/resume`, `/quit`, `/persist on|off`, `/history [N]` or
/// `CATEGORY message text`.
pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    if line.is_empty() {
        anyhow::bail!("Empty command");
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();

        return match name {
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "quit" | "exit" => Ok(Command::Quit),
            "persist" => {
                let value = parts.next().context("Missing 'on' or 'off'")?;
                match value {
                    "on" => Ok(Command::SetPersistence(true)),
                    "off" => Ok(Command::SetPersistence(false)),
                    _ => anyhow::bail!("Invalid persist value: {}", value),
                }
            }
            "history" => match parts.next() {
                Some(n) => {
                    let limit = n
                        .parse()
                        .with_context(|| format!("Invalid history length: {}", n))?;
                    Ok(Command::History(limit))
                }
                None => Ok(Command::History(DEFAULT_HISTORY)),
            },
            _ => anyhow::bail!("Unknown command: /{}", name),
        };
    }

    let (category, message) = line
        .split_once(char::is_whitespace)
        .context("Missing message after category")?;

    Ok(Command::Insert {
        category: category.to_uppercase(),
        message: message.trim().to_string(),
    })
}

/// Applies a command. `Quit` is left to the caller.
pub fn execute_command(cmd: Command, store: &LogStore, scheduler: &SchedulerHandle) {
    match cmd {
        Command::Pause => {
            scheduler.pause();
            info!("Sampling paused");
        }

        Command::Resume => {
            scheduler.resume();
            info!("Sampling resumed");
        }

        Command::SetPersistence(enabled) => {
            store.set_persistence_enabled(enabled);
            info!("Persistence {}", if enabled { "enabled" } else { "disabled" });
        }

        Command::History(limit) => match store.history(limit) {
            Ok(entries) => print!("{}", console::render_snapshot(&entries)),
            Err(e) => warn!("History unavailable: {}", e),
        },

        Command::Insert { category, message } => {
            info!("Manual entry for {}", category);
            store.insert(LogEntry::new(category, message));
        }

        Command::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn parses_control_commands() {
        assert_eq!(parse_command("/pause").unwrap(), Command::Pause);
        assert_eq!(parse_command("  /resume ").unwrap(), Command::Resume);
        assert_eq!(parse_command("/quit").unwrap(), Command::Quit);
        assert_eq!(
            parse_command("/persist off").unwrap(),
            Command::SetPersistence(false)
        );
        assert_eq!(parse_command("/history").unwrap(), Command::History(10));
        assert_eq!(parse_command("/history 3").unwrap(), Command::History(3));
    }

    #[test]
    fn parses_manual_entries() {
        assert_eq!(
            parse_command("info Operator checked the device").unwrap(),
            Command::Insert {
                category: "INFO".to_string(),
                message: "Operator checked the device".to_string(),
            }
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("INFO").is_err());
        assert!(parse_command("/reboot").is_err());
        assert!(parse_command("/persist maybe").is_err());
        assert!(parse_command("/history many").is_err());
    }

    #[tokio::test]
    async fn manual_insert_and_pause_resume() {
        let store = Arc::new(LogStore::new(20));
        let handle = Scheduler::new(Arc::clone(&store), Duration::from_secs(60)).spawn();

        execute_command(parse_command("debug hello").unwrap(), &store, &handle);
        assert_eq!(store.snapshot()[0].category, "DEBUG");
        assert_eq!(store.snapshot()[0].message, "hello");

        execute_command(Command::Pause, &store, &handle);
        assert!(!handle.is_active());
        execute_command(Command::Resume, &store, &handle);
        assert!(handle.is_active());

        handle.shutdown().await;
    }
}
