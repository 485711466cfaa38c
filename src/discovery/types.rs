//! Discovery request/status types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vendor::Vendor;

/// Default overall budget for one session
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe family selectable per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    Scan,
    Onvif,
    Hikvision,
    Dahua,
}

impl DiscoveryMethod {
    pub const ALL: [DiscoveryMethod; 4] = [
        DiscoveryMethod::Onvif,
        DiscoveryMethod::Scan,
        DiscoveryMethod::Hikvision,
        DiscoveryMethod::Dahua,
    ];

    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "scan" => Some(DiscoveryMethod::Scan),
            "onvif" => Some(DiscoveryMethod::Onvif),
            "hikvision" => Some(DiscoveryMethod::Hikvision),
            "dahua" => Some(DiscoveryMethod::Dahua),
            _ => None,
        }
    }

    pub fn vendor(&self) -> Option<Vendor> {
        match self {
            DiscoveryMethod::Hikvision => Some(Vendor::Hikvision),
            DiscoveryMethod::Dahua => Some(Vendor::Dahua),
            _ => None,
        }
    }

    /// Expand request tags: `"auto"` selects everything, unknown tags are dropped
    pub fn resolve<S: AsRef<str>>(tags: &[S]) -> Vec<DiscoveryMethod> {
        if tags.iter().any(|t| t.as_ref().trim().eq_ignore_ascii_case("auto")) {
            return Self::ALL.to_vec();
        }
        let mut methods = Vec::new();
        for tag in tags {
            match Self::parse(tag.as_ref()) {
                Some(method) if !methods.contains(&method) => methods.push(method),
                Some(_) => {}
                None => tracing::warn!(method = %tag.as_ref(), "Ignoring unknown discovery method"),
            }
        }
        methods
    }
}

/// One discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    /// Method tags, `"auto"` for all
    pub methods: Vec<String>,
    /// CIDR subnets; empty means local interfaces
    pub subnets: Vec<String>,
    /// Overall budget; the port scan gets half of it
    pub timeout: Duration,
}

impl Default for DiscoveryRequest {
    fn default() -> Self {
        Self {
            methods: vec!["auto".to_string()],
            subnets: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Error,
}

/// Snapshot of the engine's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStatus {
    pub state: SessionState,
    pub candidate_count: usize,
    pub last_started: Option<DateTime<Utc>>,
    pub last_completed: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
