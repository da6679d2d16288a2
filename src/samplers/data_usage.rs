use sysinfo::Networks;

use super::{Sampler, BYTES_PER_MB};
use crate::error::{ObserverError, Result};
use crate::log_entry::{category, LogEntry};

pub trait TrafficCounter: Send {
    /// Cumulative (received, transmitted) bytes across all interfaces.
    fn totals(&mut self) -> Result<(u64, u64)>;
}

pub struct InterfaceTraffic {
    networks: Networks,
}

impl InterfaceTraffic {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for InterfaceTraffic {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficCounter for InterfaceTraffic {
    fn totals(&mut self) -> Result<(u64, u64)> {
        self.networks.refresh(true);
        if self.networks.is_empty() {
            return Err(ObserverError::Unavailable(
                "no network interfaces reported".to_string(),
            ));
        }
        Ok(self.networks.values().fold((0, 0), |(rx, tx), data| {
            (rx + data.total_received(), tx + data.total_transmitted())
        }))
    }
}

/// Bytes moved since the first successful reading of this session.
pub struct DataUsageSampler<T> {
    counter: T,
    baseline: Option<(u64, u64)>,
}

impl<T: TrafficCounter> DataUsageSampler<T> {
    pub fn new(counter: T) -> Self {
        Self {
            counter,
            baseline: None,
        }
    }
}

fn format_usage(bytes: u64) -> String {
    format!("Data usage: {:.2} MB", bytes as f64 / BYTES_PER_MB as f64)
}

impl<T: TrafficCounter> Sampler for DataUsageSampler<T> {
    fn name(&self) -> &'static str {
        "data_usage"
    }

    fn sample(&mut self) -> Result<Vec<LogEntry>> {
        let (rx, tx) = self.counter.totals()?;
        let (base_rx, base_tx) = *self.baseline.get_or_insert((rx, tx));

        // Counters can reset when an interface goes away.
        let used = rx.saturating_sub(base_rx) + tx.saturating_sub(base_tx);
        Ok(vec![LogEntry::new(category::DATA_USAGE, format_usage(used))])
    }

    fn failure_entry(&self, _err: &ObserverError) -> LogEntry {
        LogEntry::new(category::DATA_USAGE, "Data usage unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<(u64, u64)>);

    impl TrafficCounter for Scripted {
        fn totals(&mut self) -> Result<(u64, u64)> {
            self.0
                .pop_front()
                .ok_or_else(|| ObserverError::Sampler("exhausted".to_string()))
        }
    }

    #[test]
    fn reports_delta_since_first_reading() {
        let readings = VecDeque::from(vec![
            (10 * BYTES_PER_MB, BYTES_PER_MB),
            (11 * BYTES_PER_MB, BYTES_PER_MB + BYTES_PER_MB / 2),
        ]);
        let mut sampler = DataUsageSampler::new(Scripted(readings));

        let first = sampler.sample().unwrap();
        assert_eq!(first[0].category, category::DATA_USAGE);
        assert_eq!(first[0].message, "Data usage: 0.00 MB");

        let second = sampler.sample().unwrap();
        assert_eq!(second[0].message, "Data usage: 1.50 MB");
    }

    #[test]
    fn counter_reset_does_not_underflow() {
        let readings = VecDeque::from(vec![(5000, 5000), (100, 100)]);
        let mut sampler = DataUsageSampler::new(Scripted(readings));
        sampler.sample().unwrap();

        assert_eq!(sampler.sample().unwrap()[0].message, "Data usage: 0.00 MB");
    }

    #[test]
    fn failure_is_propagated() {
        let mut sampler = DataUsageSampler::new(Scripted(VecDeque::new()));
        assert!(sampler.sample().is_err());
    }
}
