//! SOAP 1.2 client with WS-Security UsernameToken digest authentication

use quick_xml::escape::escape;
use rand::Rng;
use sha1::{Digest, Sha1};

use crate::error::{ConnectorError, ConnectorResult};
use crate::xml::XmlElement;

pub const NS_DEVICE: &str = "http://www.onvif.org/ver10/device/wsdl";
pub const NS_MEDIA: &str = "http://www.onvif.org/ver10/media/wsdl";
pub const NS_SCHEMA: &str = "http://www.onvif.org/ver10/schema";

const NS_ENVELOPE: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_DIGEST: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const BASE64_BINARY: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// PasswordDigest = Base64(SHA1(nonce + created + password))
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, hasher.finalize())
}

/// `wsse:Security` header with a fresh nonce and timestamp
pub fn ws_security_header(username: &str, password: &str) -> String {
    let nonce: [u8; 16] = rand::thread_rng().gen();
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let digest = password_digest(&nonce, &created, password);
    let nonce_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, nonce);

    format!(
        r#"<wsse:Security s:mustUnderstand="1" xmlns:wsse="{NS_WSSE}" xmlns:wsu="{NS_WSU}"><wsse:UsernameToken><wsse:Username>{}</wsse:Username><wsse:Password Type="{PASSWORD_DIGEST}">{}</wsse:Password><wsse:Nonce EncodingType="{BASE64_BINARY}">{}</wsse:Nonce><wsu:Created>{}</wsu:Created></wsse:UsernameToken></wsse:Security>"#,
        escape(username),
        digest,
        nonce_b64,
        created
    )
}

/// Wrap a body in a SOAP 1.2 envelope
pub fn envelope(header: Option<&str>, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="{NS_ENVELOPE}"><s:Header>{}</s:Header><s:Body>{}</s:Body></s:Envelope>"#,
        header.unwrap_or_default(),
        body
    )
}

/// Authenticated SOAP caller shared by every ONVIF service endpoint
#[derive(Clone)]
pub struct SoapClient {
    http: reqwest::Client,
    username: String,
    password: String,
}

impl SoapClient {
    pub fn new(http: reqwest::Client, username: &str, password: &str) -> Self {
        Self {
            http,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// POST one operation and return the parsed envelope
    pub async fn call(&self, url: &str, action: &str, body: &str) -> ConnectorResult<XmlElement> {
        let header = if self.username.is_empty() {
            None
        } else {
            Some(ws_security_header(&self.username, &self.password))
        };
        let request = envelope(header.as_deref(), body);

        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(request)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        // Faults arrive with 400/500 and an XML body
        let parsed = XmlElement::parse(&text);
        if let Ok(root) = &parsed {
            if let Some(fault) = root.descendant("Fault") {
                return Err(fault_error(fault, status, action));
            }
        }
        if !status.is_success() {
            return Err(ConnectorError::from_status(status, action));
        }
        Ok(parsed?)
    }
}

fn fault_error(fault: &XmlElement, status: reqwest::StatusCode, action: &str) -> ConnectorError {
    let reason = fault
        .descendant("Reason")
        .and_then(|r| r.descendant_text("Text"))
        .or_else(|| fault.descendant_text("faultstring"))
        .unwrap_or_else(|| "SOAP fault".to_string());
    let codes: Vec<String> = fault
        .descendants("Value")
        .into_iter()
        .filter_map(XmlElement::text)
        .collect();
    let message = format!("{}: {}", action, reason);

    if codes.iter().any(|c| c.ends_with("NotAuthorized")) {
        ConnectorError::Auth(message)
    } else if codes.iter().any(|c| c.ends_with("ActionNotSupported")) {
        ConnectorError::Unsupported(message)
    } else {
        ConnectorError::Http {
            status: status.as_u16(),
            message,
        }
    }
}
