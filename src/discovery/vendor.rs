//! Vendor identity probes layered on open ports
//!
//! One unauthenticated GET against a vendor-specific endpoint. A 401 or an
//! identifying 200 confirms the vendor; anything else is silently skipped.

use std::net::SocketAddr;
use std::time::Duration;

use super::transport::{HttpProbeResponse, ProbeTransport};
use crate::connector::hikvision::types::IsapiDeviceInfo;
use crate::connector::url_host;
use crate::models::DiscoveredCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Hikvision,
    Dahua,
}

/// What a successful probe learned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorMatch {
    pub requires_auth: bool,
    pub device_name: Option<String>,
    pub model: Option<String>,
}

impl Vendor {
    pub fn tag(&self) -> &'static str {
        match self {
            Vendor::Hikvision => "hikvision",
            Vendor::Dahua => "dahua",
        }
    }

    pub fn method_tag(&self) -> &'static str {
        match self {
            Vendor::Hikvision => "hikvision_api_check",
            Vendor::Dahua => "dahua_api_check",
        }
    }

    /// Ports the vendor's identity endpoint is served on
    pub fn ports(&self) -> &'static [u16] {
        match self {
            Vendor::Hikvision => &[80, 8000],
            Vendor::Dahua => &[80, 37777, 37778, 37779],
        }
    }

    pub fn identity_path(&self) -> &'static str {
        match self {
            Vendor::Hikvision => "/ISAPI/System/deviceInfo",
            Vendor::Dahua => "/cgi-bin/magicBox.cgi?action=getDeviceType",
        }
    }

    pub fn classify(&self, response: &HttpProbeResponse) -> Option<VendorMatch> {
        match response.status {
            401 => Some(VendorMatch {
                requires_auth: true,
                ..Default::default()
            }),
            200 => match self {
                Vendor::Hikvision => {
                    let info = IsapiDeviceInfo::parse(&response.body).ok()?;
                    info.is_identified().then(|| VendorMatch {
                        requires_auth: false,
                        device_name: info.device_name,
                        model: info.model,
                    })
                }
                Vendor::Dahua => {
                    let (_, rest) = response.body.split_once("deviceType=")?;
                    let model = rest.lines().next().map(str::trim).filter(|m| !m.is_empty());
                    Some(VendorMatch {
                        requires_auth: false,
                        device_name: None,
                        model: model.map(str::to_string),
                    })
                }
            },
            _ => None,
        }
    }
}

/// Probe one open address with every applicable vendor, first match wins
pub async fn probe(
    transport: &dyn ProbeTransport,
    addr: SocketAddr,
    vendors: &[Vendor],
    timeout: Duration,
) -> Option<DiscoveredCandidate> {
    for vendor in vendors.iter().filter(|v| v.ports().contains(&addr.port())) {
        let url = format!(
            "http://{}:{}{}",
            url_host(&addr.ip().to_string()),
            addr.port(),
            vendor.identity_path()
        );
        let response = tokio::time::timeout(timeout, transport.http_get(&url, timeout))
            .await
            .ok()
            .flatten();
        let Some(response) = response else {
            continue;
        };

        if let Some(found) = vendor.classify(&response) {
            tracing::debug!(
                ip = %addr.ip(),
                port = addr.port(),
                vendor = vendor.tag(),
                requires_auth = found.requires_auth,
                "Vendor probe matched"
            );
            let mut candidate = DiscoveredCandidate::new(addr.ip(), addr.port(), vendor.method_tag())
                .confirmed(vendor.tag(), found.requires_auth);
            candidate.device_name = found.device_name;
            candidate.model = found.model;
            return Some(candidate);
        }
    }
    None
}

/// Probe open addresses one at a time
pub async fn probe_all(
    transport: &dyn ProbeTransport,
    open: &[SocketAddr],
    vendors: &[Vendor],
    timeout: Duration,
) -> Vec<DiscoveredCandidate> {
    let mut found = Vec::new();
    if vendors.is_empty() {
        return found;
    }
    for addr in open {
        if let Some(candidate) = probe(transport, *addr, vendors, timeout).await {
            found.push(candidate);
        }
    }
    found
}
