//! ConnectorRegistry - maps a type tag to a driver constructor
//!
//! Drivers register explicitly through their module's `register` function.
//! The registry stores constructors only; every `create` returns a fresh,
//! disconnected driver owned by the caller.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use super::{hikvision, onvif, Connector, ConnectorParams};
use crate::error::{Error, Result};

/// Driver constructor
pub type ConnectorCtor = fn(ConnectorParams) -> Box<dyn Connector>;

/// Keys consumed by `create_from_config`; everything else becomes `extra`
const CONFIG_FIELDS: [&str; 5] = ["type", "ip_address", "port", "username", "password"];

#[derive(Default)]
pub struct ConnectorRegistry {
    ctors: HashMap<String, ConnectorCtor>,
}

impl ConnectorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in driver
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        onvif::register(&mut registry)?;
        hikvision::register(&mut registry)?;
        Ok(registry)
    }

    pub fn register(&mut self, type_tag: &str, ctor: ConnectorCtor) -> Result<()> {
        if self.ctors.contains_key(type_tag) {
            return Err(Error::DuplicateConnector(type_tag.to_string()));
        }
        self.ctors.insert(type_tag.to_string(), ctor);
        tracing::debug!(connector = %type_tag, "Registered connector");
        Ok(())
    }

    /// Registered tags, sorted
    pub fn connector_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.ctors.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.ctors.contains_key(type_tag)
    }

    /// Instantiate a driver. `extra["device_id"]` overrides the generated id.
    pub fn create(
        &self,
        type_tag: &str,
        ip_address: &str,
        port: u16,
        username: &str,
        password: &str,
        extra: Map<String, Value>,
    ) -> Result<Box<dyn Connector>> {
        let ctor = self
            .ctors
            .get(type_tag)
            .ok_or_else(|| Error::UnknownConnector(type_tag.to_string()))?;

        let device_id = extra
            .get("device_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let params = ConnectorParams {
            device_id,
            ip_address: ip_address.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            extra,
        };
        Ok(ctor(params))
    }

    /// Instantiate from a loosely typed config record
    pub fn create_from_config(&self, config: &Map<String, Value>) -> Result<Box<dyn Connector>> {
        let type_tag = required_str(config, "type")?;
        let ip_address = required_str(config, "ip_address")?;
        let port = parse_port(required(config, "port")?)?;
        let username = required_str(config, "username")?;
        let password = required_str(config, "password")?;

        let extra: Map<String, Value> = config
            .iter()
            .filter(|(key, _)| !CONFIG_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        self.create(type_tag, ip_address, port, username, password, extra)
    }
}

fn required<'a>(config: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    config
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::MissingConfigField(key.to_string()))
}

fn required_str<'a>(config: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    required(config, key)?
        .as_str()
        .ok_or_else(|| Error::InvalidConfig(format!("{} must be a string", key)))
}

fn parse_port(value: &Value) -> Result<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    port.ok_or_else(|| Error::InvalidConfig(format!("port must be 0-65535, got {}", value)))
}

/// Process-wide registry with the built-in drivers
pub fn global() -> &'static ConnectorRegistry {
    static REGISTRY: OnceLock<ConnectorRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        ConnectorRegistry::builtin().expect("built-in connectors must have unique tags")
    })
}
