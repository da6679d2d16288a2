use std::net::IpAddr;
use sysinfo::Networks;

use super::Sampler;
use crate::error::{ObserverError, Result};
use crate::log_entry::{category, LogEntry};

pub const CONNECTED: &str = "Device connected";
pub const DISCONNECTED: &str = "Connection error detected";

pub trait ConnectivityCheck: Send {
    /// Whether a usable path to the internet exists.
    fn has_internet(&mut self) -> Result<bool>;
}

/// Treats the device as online when any non-loopback interface carries a
/// routable address.
///
/// No traffic is sent, so a LAN with no upstream still reads as connected.
/// The latency probe is the signal that covers end-to-end reachability.
pub struct InterfaceConnectivity {
    networks: Networks,
}

impl InterfaceConnectivity {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for InterfaceConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

fn is_routable(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified(),
        // fe80::/10
        IpAddr::V6(v6) => {
            !v6.is_loopback() && !v6.is_unspecified() && (v6.segments()[0] & 0xffc0) != 0xfe80
        }
    }
}

impl ConnectivityCheck for InterfaceConnectivity {
    fn has_internet(&mut self) -> Result<bool> {
        self.networks.refresh(true);
        if self.networks.is_empty() {
            return Err(ObserverError::Unavailable(
                "no network interfaces reported".to_string(),
            ));
        }
        Ok(self
            .networks
            .values()
            .flat_map(|data| data.ip_networks())
            .any(|net| is_routable(&net.addr)))
    }
}

pub struct ConnectivitySampler<C> {
    check: C,
}

impl<C: ConnectivityCheck> ConnectivitySampler<C> {
    pub fn new(check: C) -> Self {
        Self { check }
    }
}

impl<C: ConnectivityCheck> Sampler for ConnectivitySampler<C> {
    fn name(&self) -> &'static str {
        "connectivity"
    }

    fn sample(&mut self) -> Result<Vec<LogEntry>> {
        let message = if self.check.has_internet()? {
            CONNECTED
        } else {
            DISCONNECTED
        };
        Ok(vec![LogEntry::new(category::CONNECTION, message)])
    }

    fn failure_entry(&self, _err: &ObserverError) -> LogEntry {
        LogEntry::new(category::CONNECTION, DISCONNECTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    struct Fixed(bool);

    impl ConnectivityCheck for Fixed {
        fn has_internet(&mut self) -> Result<bool> {
            Ok(self.0)
        }
    }

    #[test]
    fn reports_connected_and_disconnected() {
        let entry = &ConnectivitySampler::new(Fixed(true)).sample().unwrap()[0];
        assert_eq!(entry.category, category::CONNECTION);
        assert_eq!(entry.message, CONNECTED);

        let entry = &ConnectivitySampler::new(Fixed(false)).sample().unwrap()[0];
        assert_eq!(entry.message, DISCONNECTED);
    }

    #[test]
    fn failure_reads_as_connection_error() {
        let sampler = ConnectivitySampler::new(Fixed(true));
        let entry = sampler.failure_entry(&ObserverError::Unavailable("x".to_string()));
        assert_eq!(entry.category, category::CONNECTION);
        assert_eq!(entry.message, DISCONNECTED);
    }

    #[test]
    fn loopback_and_link_local_are_not_routable() {
        assert!(!is_routable(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(!is_routable(&IpAddr::V4(Ipv4Addr::new(169, 254, 1, 1))));
        assert!(!is_routable(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(!is_routable(&"fe80::1".parse().unwrap()));
        assert!(is_routable(&IpAddr::V4(Ipv4Addr::new(192, 168, 0, 10))));
        assert!(is_routable(&"2001:db8::1".parse().unwrap()));
    }
}
