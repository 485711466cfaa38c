//! WS-Discovery multicast probe for ONVIF video transmitters

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use super::transport::ProbeTransport;
use crate::connector::onvif::types::name_from_scopes;
use crate::models::DiscoveredCandidate;
use crate::xml::XmlElement;

pub const METHOD_TAG: &str = "onvif_ws_discovery";

/// 239.255.255.250:3702
pub const MULTICAST_GROUP: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 3702);

const DEFAULT_DEVICE_PORT: u16 = 80;

/// Probe for `dn:NetworkVideoTransmitter` with a fresh message id
pub fn probe_message() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope" xmlns:w="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery" xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <e:Header>
    <w:MessageID>uuid:{}</w:MessageID>
    <w:To e:mustUnderstand="true">urn:schemas-xmlsoap-org:ws:2005:04:discovery</w:To>
    <w:Action e:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</w:Action>
  </e:Header>
  <e:Body>
    <d:Probe>
      <d:Types>dn:NetworkVideoTransmitter</d:Types>
    </d:Probe>
  </e:Body>
</e:Envelope>"#,
        uuid::Uuid::new_v4()
    )
}

/// Candidate from one ProbeMatch reply; `None` when the payload is not XML
pub fn parse_reply(from: IpAddr, payload: &[u8]) -> Option<DiscoveredCandidate> {
    let text = String::from_utf8_lossy(payload);
    let root = XmlElement::parse(&text).ok()?;

    let service_urls: Vec<String> = root
        .descendant_text("XAddrs")
        .map(|x| x.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    // First XAddr with an explicit port
    let port = service_urls
        .iter()
        .filter_map(|u| reqwest::Url::parse(u).ok())
        .find_map(|u| u.port())
        .unwrap_or(DEFAULT_DEVICE_PORT);

    let device_name = root
        .descendant_text("Scopes")
        .and_then(|scopes| name_from_scopes(scopes.split_whitespace()));

    // No HTTP status in a multicast reply, so nothing says auth is required
    let mut candidate = DiscoveredCandidate::new(from, port, METHOD_TAG).confirmed("onvif", false);
    candidate.service_urls = service_urls;
    candidate.device_name = device_name;
    Some(candidate)
}

/// Send one probe and collect replies for the whole `window`,
/// or until `max_devices` distinct hosts answered
pub async fn probe(
    transport: &dyn ProbeTransport,
    window: Duration,
    max_devices: usize,
) -> Vec<DiscoveredCandidate> {
    let payload = probe_message();
    let mut seen: HashSet<IpAddr> = HashSet::new();
    let mut candidates: Vec<DiscoveredCandidate> = Vec::new();

    let mut on_reply = |from: SocketAddr, data: &[u8]| {
        let ip = from.ip();
        if !seen.contains(&ip) {
            match parse_reply(ip, data) {
                Some(candidate) => {
                    tracing::debug!(ip = %ip, port = candidate.port, "WS-Discovery reply");
                    seen.insert(ip);
                    candidates.push(candidate);
                }
                None => tracing::trace!(ip = %ip, "Ignoring non-XML multicast reply"),
            }
        }
        seen.len() < max_devices
    };

    if let Err(e) = transport
        .multicast_exchange(payload.as_bytes(), MULTICAST_GROUP, window, &mut on_reply)
        .await
    {
        tracing::warn!(error = %e, "WS-Discovery probe failed");
    }

    candidates
}
