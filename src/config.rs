//! Runtime configuration
//!
//! Every value has a compiled-in default and can be overridden through
//! `CAMLINK_*` environment variables (a `.env` file is honoured by the binary).

use std::time::Duration;

/// Common video-device ports probed by the port scan
pub const DEFAULT_SCAN_PORTS: &[u16] = &[80, 443, 554, 8000, 8080, 8554, 37777];

/// Subnet used when no local interface yields one
pub const DEFAULT_SUBNET: &str = "192.168.1.0/24";

/// Discovery engine configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum simultaneous TCP connection attempts across the whole session
    pub scan_concurrency: usize,
    /// Upper bound for one TCP connect attempt
    pub port_connect_timeout: Duration,
    /// Timeout for one vendor HTTP probe
    pub vendor_probe_timeout: Duration,
    /// Stop collecting WS-Discovery replies after this many devices
    pub max_multicast_devices: usize,
    /// Hosts beyond this count in one subnet are not scanned
    pub max_hosts_per_subnet: usize,
    /// Fallback when interface enumeration finds nothing
    pub default_subnet: String,
    /// Ports probed by the "scan" method
    pub scan_ports: Vec<u16>,
    /// Inject synthetic candidates when a run finds nothing (staging only)
    pub demo_fallback: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_concurrency: 50,
            port_connect_timeout: Duration::from_millis(500),
            vendor_probe_timeout: Duration::from_millis(1000),
            max_multicast_devices: 100,
            max_hosts_per_subnet: 1024,
            default_subnet: DEFAULT_SUBNET.to_string(),
            scan_ports: DEFAULT_SCAN_PORTS.to_vec(),
            demo_fallback: false,
        }
    }
}

impl DiscoveryConfig {
    /// Defaults overridden by `CAMLINK_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            scan_concurrency: env_parse("CAMLINK_SCAN_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.scan_concurrency),
            port_connect_timeout: env_parse("CAMLINK_PORT_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.port_connect_timeout),
            vendor_probe_timeout: env_parse("CAMLINK_VENDOR_PROBE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.vendor_probe_timeout),
            max_multicast_devices: env_parse("CAMLINK_MAX_MULTICAST_DEVICES")
                .unwrap_or(defaults.max_multicast_devices),
            max_hosts_per_subnet: env_parse("CAMLINK_MAX_HOSTS_PER_SUBNET")
                .unwrap_or(defaults.max_hosts_per_subnet),
            default_subnet: std::env::var("CAMLINK_DEFAULT_SUBNET")
                .unwrap_or(defaults.default_subnet),
            scan_ports: defaults.scan_ports,
            demo_fallback: std::env::var("CAMLINK_DEMO_FALLBACK")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.demo_fallback),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = %key, value = %raw, "Ignoring unparsable config value");
            None
        }
    }
}
