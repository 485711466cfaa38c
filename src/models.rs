//! Shared descriptors
//!
//! Plain value types exchanged between discovery, the registry and drivers.
//! Nothing here talks to the network.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Discovered,
    Online,
    Offline,
    Error,
}

/// Stream transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamTransport {
    #[default]
    Rtsp,
    Http,
    Other,
}

/// Identity and metadata for one physical device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Assigned by the caller or registry, never by the device
    pub id: String,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub ip_address: String,
    pub port: u16,
    pub firmware: Option<String>,
    pub serial_number: Option<String>,
    /// 0 = unknown
    pub channel_count: u32,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub capabilities: BTreeMap<String, serde_json::Value>,
}

impl DeviceDescriptor {
    /// Devices reporting 0 or 1 channels are enumerated as a single camera
    pub fn is_single_channel(&self) -> bool {
        self.channel_count <= 1
    }

    /// Record a successful interaction (e.g. after a snapshot)
    pub fn mark_seen(&mut self, status: DeviceStatus) {
        self.status = status;
        self.last_seen = Some(Utc::now());
    }

    /// Boolean capability lookup, `false` when absent
    pub fn has_capability(&self, key: &str) -> bool {
        self.capabilities
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// One addressable video feed on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Unique within the owning device
    pub id: String,
    pub name: String,
    /// Fully resolved transport URL, may embed credentials
    pub url: String,
    pub transport: StreamTransport,
    /// 1-based
    pub channel: u32,
    /// "WxH"
    pub resolution: Option<String>,
    pub fps: Option<u32>,
    pub encoding: Option<String>,
    pub ptz_capable: bool,
    pub audio_capable: bool,
    pub device_id: String,
}

/// Provisional, unauthenticated discovery result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredCandidate {
    pub ip_address: IpAddr,
    pub port: u16,
    /// Vendor tag or "unknown"
    pub guessed_type: String,
    /// Set only when a vendor probe or WS-Discovery reply identified the device
    #[serde(default)]
    pub type_confirmed: bool,
    pub requires_auth: bool,
    pub discovery_method: String,
    pub discovered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub demo_device: bool,
}

impl DiscoveredCandidate {
    pub const UNKNOWN_TYPE: &'static str = "unknown";

    pub fn new(ip_address: IpAddr, port: u16, discovery_method: &str) -> Self {
        Self {
            ip_address,
            port,
            guessed_type: Self::UNKNOWN_TYPE.to_string(),
            type_confirmed: false,
            requires_auth: false,
            discovery_method: discovery_method.to_string(),
            discovered_at: Utc::now(),
            possible_types: Vec::new(),
            service_urls: Vec::new(),
            device_name: None,
            model: None,
            demo_device: false,
        }
    }

    /// Merge key
    pub fn key(&self) -> (IpAddr, u16) {
        (self.ip_address, self.port)
    }

    /// Heuristic type (port-based), never authoritative
    pub fn with_guess(mut self, guessed_type: &str, possible_types: &[&str]) -> Self {
        self.guessed_type = guessed_type.to_string();
        self.possible_types = possible_types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Type established by a protocol-level answer
    pub fn confirmed(mut self, device_type: &str, requires_auth: bool) -> Self {
        self.guessed_type = device_type.to_string();
        self.type_confirmed = true;
        self.requires_auth = requires_auth;
        self
    }
}
