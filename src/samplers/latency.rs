//! Round-trip probe against a fixed URL.
//!
//! The probe issues a HEAD request with separate connect and read timeouts
//! and is never retried. Every outcome, including timeouts, becomes a
//! `LATENCY` entry.

use log::{debug, warn};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::Result;
use crate::log_entry::{category, LogEntry};

pub const NON_SUCCESS_MESSAGE: &str = "Failed to measure latency";
pub const TRANSPORT_ERROR_MESSAGE: &str = "Latency measurement error: internet disconnected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    Fast,
    Slow,
}

/// Fast when strictly below the threshold.
pub fn classify_latency(rtt_ms: u64, fast_threshold_ms: u64) -> LatencyClass {
    if rtt_ms < fast_threshold_ms {
        LatencyClass::Fast
    } else {
        LatencyClass::Slow
    }
}

pub fn latency_message(rtt_ms: u64, fast_threshold_ms: u64) -> String {
    match classify_latency(rtt_ms, fast_threshold_ms) {
        LatencyClass::Fast => format!("Fast connection: {}ms", rtt_ms),
        LatencyClass::Slow => format!("Slow connection: {}ms", rtt_ms),
    }
}

#[derive(Clone)]
pub struct LatencyProbe {
    client: reqwest::Client,
    url: String,
    fast_threshold_ms: u64,
}

impl LatencyProbe {
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
        fast_threshold_ms: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            fast_threshold_ms,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn measure(&self) -> LogEntry {
        let start = Instant::now();

        let message = match self.client.head(&self.url).send().await {
            Ok(response) if response.status().is_success() => {
                let rtt_ms = start.elapsed().as_millis() as u64;
                debug!("Latency probe to {} took {}ms", self.url, rtt_ms);
                latency_message(rtt_ms, self.fast_threshold_ms)
            }
            Ok(response) => {
                warn!(
                    "Latency probe to {} returned status {}",
                    self.url,
                    response.status()
                );
                NON_SUCCESS_MESSAGE.to_string()
            }
            Err(e) => {
                warn!("Latency probe to {} failed: {}", self.url, e);
                TRANSPORT_ERROR_MESSAGE.to_string()
            }
        };

        LogEntry::new(category::LATENCY, message)
    }
}
