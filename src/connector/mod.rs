//! Connector - uniform capability contract for video devices
//!
//! Every vendor driver implements [`Connector`]. Callers obtain drivers
//! through [`registry::ConnectorRegistry`] and never branch on vendor.
//!
//! ## Lifecycle
//!
//! ```text
//! create → connect → get_device_info / list_streams / snapshot → disconnect
//! ```
//!
//! `get_device_info`, `list_streams` and `snapshot` connect on demand.

pub mod hikvision;
pub mod onvif;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::ConnectorResult;
use crate::models::{DeviceDescriptor, StreamDescriptor};

pub use registry::{global, ConnectorCtor, ConnectorRegistry};

/// Default RTSP port when `extra["rtsp_port"]` is absent
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Default per-request timeout (seconds) when `extra["timeout"]` is absent
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Construction parameters shared by all drivers
#[derive(Debug, Clone, Default)]
pub struct ConnectorParams {
    pub device_id: String,
    pub ip_address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Driver-specific keys (`rtsp_port`, `use_https`, `timeout`, ...)
    pub extra: Map<String, Value>,
}

impl ConnectorParams {
    /// Integer extra that fits in a port; numeric strings are accepted
    pub fn extra_u16(&self, key: &str) -> Option<u16> {
        self.extra_u64(key).and_then(|v| u16::try_from(v).ok())
    }

    pub fn extra_u64(&self, key: &str) -> Option<u64> {
        match self.extra.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn extra_bool(&self, key: &str) -> Option<bool> {
        match self.extra.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    pub fn rtsp_port(&self) -> u16 {
        self.extra_u16("rtsp_port").unwrap_or(DEFAULT_RTSP_PORT)
    }

    pub fn use_https(&self) -> bool {
        self.extra_bool("use_https").unwrap_or(false)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.extra_u64("timeout").unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// Capability contract implemented by every device driver
#[async_trait]
pub trait Connector: Send + Sync {
    /// Registry tag of this driver ("onvif", "hikvision", ...)
    fn connector_type(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    fn device_id(&self) -> &str;

    /// Handshake with the device. Calling again while connected is a no-op.
    async fn connect(&mut self) -> ConnectorResult<()>;

    /// Drop the session. Safe to call when not connected.
    async fn disconnect(&mut self) -> ConnectorResult<()>;

    async fn get_device_info(&mut self) -> ConnectorResult<DeviceDescriptor>;

    async fn list_streams(&mut self) -> ConnectorResult<Vec<StreamDescriptor>>;

    /// Resolve the transport URL for a driver-specific channel id
    async fn get_stream_url(&mut self, channel_id: &str) -> ConnectorResult<String>;

    /// Fetch one still image
    async fn snapshot(&mut self, channel_id: &str) -> ConnectorResult<Bytes>;

    /// Connect if needed and report whether the device answered
    async fn test_connection(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }
        match self.connect().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    device_id = %self.device_id(),
                    connector = self.connector_type(),
                    error = %e,
                    "Connection test failed"
                );
                false
            }
        }
    }
}

/// Build the reqwest client used by HTTP drivers
pub(crate) fn http_client(params: &ConnectorParams) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(params.timeout())
        .danger_accept_invalid_certs(params.use_https())
        .build()
        .expect("Failed to create HTTP client")
}

/// Host part of a URL (IPv6 literals bracketed)
pub(crate) fn url_host(ip_address: &str) -> String {
    match ip_address.parse::<std::net::Ipv6Addr>() {
        Ok(_) => format!("[{}]", ip_address),
        Err(_) => ip_address.to_string(),
    }
}

/// `scheme://ip:port` for the device's HTTP API
pub(crate) fn http_base_url(params: &ConnectorParams) -> String {
    let scheme = if params.use_https() { "https" } else { "http" };
    format!("{}://{}:{}", scheme, url_host(&params.ip_address), params.port)
}

/// RTSP URL on the device's RTSP port with percent-encoded credentials
pub(crate) fn rtsp_url(params: &ConnectorParams, path: &str) -> ConnectorResult<String> {
    let raw = format!(
        "rtsp://{}:{}{}",
        url_host(&params.ip_address),
        params.rtsp_port(),
        path
    );
    let mut url = reqwest::Url::parse(&raw)
        .map_err(|e| crate::error::ConnectorError::Malformed(format!("{}: {}", raw, e)))?;

    if !params.username.is_empty() {
        let rejected = |_| crate::error::ConnectorError::Malformed(format!("{}: credentials", raw));
        url.set_username(&params.username).map_err(rejected)?;
        url.set_password(Some(&params.password)).map_err(rejected)?;
    }
    Ok(url.to_string())
}
