use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Well-known category tags. The store treats categories as opaque keys,
/// so callers are free to use tags outside this list.
pub mod category {
    pub const INFO: &str = "INFO";
    pub const DEBUG: &str = "DEBUG";
    pub const ERROR: &str = "ERROR";
    pub const WARNING: &str = "WARNING";
    pub const CONNECTION: &str = "CONNECTION";
    pub const DATA_USAGE: &str = "DATA_USAGE";
    pub const MEMORY_USAGE: &str = "MEMORY_USAGE";
    pub const STORAGE_STATS: &str = "STORAGE_STATS";
    pub const STORAGE_LEGACY: &str = "STORAGE_LEGACY";
    pub const LATENCY: &str = "LATENCY";
}

/// A single status line. One live entry exists per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Assigned by the store on insertion; 0 until then.
    pub id: u64,
    /// Milliseconds since the Unix epoch, set by the producer.
    pub timestamp: i64,
    pub category: String,
    /// Final rendered text.
    pub message: String,
}

impl LogEntry {
    /// Creates an entry stamped with the current wall-clock time.
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_timestamp(Utc::now().timestamp_millis(), category, message)
    }

    pub fn with_timestamp(
        timestamp: i64,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            timestamp,
            category: category.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_has_no_id_and_current_time() {
        let before = Utc::now().timestamp_millis();
        let entry = LogEntry::new(category::CONNECTION, "Device connected");
        let after = Utc::now().timestamp_millis();

        assert_eq!(entry.id, 0);
        assert!(entry.timestamp >= before && entry.timestamp <= after);
        assert_eq!(entry.category, "CONNECTION");
        assert_eq!(entry.message, "Device connected");
    }

    #[test]
    fn serializes_with_all_fields() {
        let entry = LogEntry::with_timestamp(1_700_000_000_000, category::LATENCY, "Fast connection: 42ms");
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["id"], 0);
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(json["category"], "LATENCY");
        assert_eq!(json["message"], "Fast connection: 42ms");
    }
}
