//! camlink - device discovery and connector layer for network video devices
//!
//! Finds IP cameras, DVRs and NVRs on local networks and drives them
//! through one vendor-neutral contract.
//!
//! ## Architecture
//!
//! 1. Discovery - port scan, WS-Discovery multicast, vendor HTTP probes
//! 2. ConnectorRegistry - type tag → driver constructor
//! 3. Connector - uniform capability trait (ONVIF, Hikvision ISAPI)
//!
//! Discovery yields unauthenticated [`DiscoveredCandidate`]s. With
//! credentials the registry builds a driver, which returns authoritative
//! [`DeviceDescriptor`]s and [`StreamDescriptor`]s.

pub mod config;
pub mod connector;
pub mod discovery;
pub mod error;
pub mod models;
pub mod xml;

pub use config::DiscoveryConfig;
pub use connector::{Connector, ConnectorParams, ConnectorRegistry};
pub use discovery::{DiscoveryEngine, DiscoveryRequest, DiscoveryStatus};
pub use error::{ConnectorError, ConnectorResult, Error, Result};
pub use models::{
    DeviceDescriptor, DeviceStatus, DiscoveredCandidate, StreamDescriptor, StreamTransport,
};
