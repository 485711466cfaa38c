//! Bounded TCP port scan

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use super::transport::ProbeTransport;
use crate::models::DiscoveredCandidate;

pub const METHOD_TAG: &str = "port_scan";

const HIKVISION_TYPES: &[&str] = &["hikvision"];
const DAHUA_TYPES: &[&str] = &["dahua"];
const RTSP_TYPES: &[&str] = &["rtsp_device", "camera", "dvr", "nvr"];
const HTTP_TYPES: &[&str] = &["http_device", "camera", "dvr", "nvr"];
const NO_TYPES: &[&str] = &[];

/// Best-effort classification of an open port: `(guessed_type, possible_types)`
pub fn port_guess(port: u16) -> (&'static str, &'static [&'static str]) {
    match port {
        8000 => ("hikvision", HIKVISION_TYPES),
        37777..=37779 => ("dahua", DAHUA_TYPES),
        554 | 8554 => (DiscoveredCandidate::UNKNOWN_TYPE, RTSP_TYPES),
        80 | 443 | 8080 => (DiscoveredCandidate::UNKNOWN_TYPE, HTTP_TYPES),
        _ => (DiscoveredCandidate::UNKNOWN_TYPE, NO_TYPES),
    }
}

/// Candidate for an open port found by the scan
pub fn scan_candidate(addr: SocketAddr) -> DiscoveredCandidate {
    let (guessed_type, possible_types) = port_guess(addr.port());
    DiscoveredCandidate::new(addr.ip(), addr.port(), METHOD_TAG)
        .with_guess(guessed_type, possible_types)
}

/// Probe every `host × port`, at most `limiter` permits in flight.
/// Returns the open addresses in host-then-port order.
pub async fn scan(
    transport: &dyn ProbeTransport,
    limiter: &Semaphore,
    hosts: &[IpAddr],
    ports: &[u16],
    connect_timeout: Duration,
) -> Vec<SocketAddr> {
    let attempts = hosts
        .iter()
        .flat_map(|ip| ports.iter().map(move |port| SocketAddr::new(*ip, *port)))
        .map(|addr| async move {
            let Ok(_permit) = limiter.acquire().await else {
                return None;
            };
            let open = tokio::time::timeout(connect_timeout, transport.tcp_connect(addr, connect_timeout))
                .await
                .unwrap_or(false);
            if open {
                tracing::debug!(ip = %addr.ip(), port = addr.port(), "Open port");
                Some(addr)
            } else {
                None
            }
        });

    join_all(attempts).await.into_iter().flatten().collect()
}
