//! Error handling for camlink
//!
//! Two layers:
//!
//! - [`ConnectorError`]: every driver operation fails with this type, so
//!   callers never see reqwest or XML errors from a specific vendor.
//! - [`Error`]: crate-level errors (registry lookups, discovery engine
//!   faults) that wrap `ConnectorError` when a driver is involved.

use crate::xml::XmlError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for driver operations
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

/// Driver-level failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// Connection refused, reset, DNS failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request did not complete within the driver timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Device rejected the credentials
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Unexpected HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body could not be parsed
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Device does not offer the requested service
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Channel id does not match the driver's expected shape
    #[error("Invalid channel id: {0}")]
    InvalidChannel(String),

    /// Operation needs a session that could not be established
    #[error("Not connected: {0}")]
    NotConnected(String),
}

impl ConnectorError {
    /// Map a non-success HTTP status to the matching variant
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                ConnectorError::Auth(format!("{} (HTTP {})", context, status.as_u16()))
            }
            _ => ConnectorError::Http {
                status: status.as_u16(),
                message: context.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ConnectorError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            ConnectorError::Transport(e.to_string())
        } else if e.is_decode() || e.is_body() {
            ConnectorError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            ConnectorError::from_status(status, &e.to_string())
        } else {
            ConnectorError::Transport(e.to_string())
        }
    }
}

impl From<XmlError> for ConnectorError {
    fn from(e: XmlError) -> Self {
        ConnectorError::Malformed(e.to_string())
    }
}

/// Crate-level error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No driver registered under the tag
    #[error("Unknown connector type: {0}")]
    UnknownConnector(String),

    /// A driver tried to register a tag twice
    #[error("Connector type already registered: {0}")]
    DuplicateConnector(String),

    /// Required key absent from a connector config record
    #[error("Missing config field: {0}")]
    MissingConfigField(String),

    /// Config value present but unusable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Driver failure
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Engine-level discovery fault (e.g. interfaces could not be enumerated)
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
