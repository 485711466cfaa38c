//! ISAPI response types

use std::collections::HashSet;

use crate::error::ConnectorError;
use crate::xml::XmlElement;

/// `/ISAPI/System/deviceInfo`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsapiDeviceInfo {
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
}

impl IsapiDeviceInfo {
    pub fn from_xml(root: &XmlElement) -> Self {
        Self {
            device_name: root.descendant_text("deviceName"),
            device_type: root.descendant_text("deviceType"),
            model: root.descendant_text("model"),
            serial_number: root.descendant_text("serialNumber"),
            firmware_version: root.descendant_text("firmwareVersion"),
        }
    }

    pub fn parse(xml: &str) -> Result<Self, ConnectorError> {
        Ok(Self::from_xml(&XmlElement::parse(xml)?))
    }

    /// Unauthenticated answer that identifies a Hikvision device
    pub fn is_identified(&self) -> bool {
        self.device_type.is_some() && self.model.is_some()
    }
}

/// One `InputProxyChannel` of a DVR/NVR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputProxyChannel {
    pub id: String,
    pub name: Option<String>,
}

impl InputProxyChannel {
    /// Channel number from the last `_` segment of the id (`ip_1_3` → 3);
    /// `None` when it is not a positive integer
    pub fn number(&self) -> Option<u32> {
        self.id
            .rsplit('_')
            .next()
            .and_then(|n| n.parse().ok())
            .filter(|n| *n > 0)
    }
}

/// One distinct, 1-based channel number per entry. Ids carrying a number keep
/// it; the rest (and repeats) take the lowest free number in list order.
pub fn channel_numbers(channels: &[InputProxyChannel]) -> Vec<u32> {
    let mut used = HashSet::new();
    let explicit: Vec<Option<u32>> = channels
        .iter()
        .map(|c| c.number().filter(|n| used.insert(*n)))
        .collect();

    let mut next = 1;
    explicit
        .into_iter()
        .map(|number| {
            number.unwrap_or_else(|| {
                while used.contains(&next) {
                    next += 1;
                }
                used.insert(next);
                next
            })
        })
        .collect()
}

/// `/ISAPI/ContentMgmt/InputProxy/channels`; entries without an id are skipped
pub fn parse_channels(xml: &str) -> Result<Vec<InputProxyChannel>, ConnectorError> {
    let root = XmlElement::parse(xml)?;
    Ok(root
        .descendants("InputProxyChannel")
        .into_iter()
        .filter_map(|channel| {
            Some(InputProxyChannel {
                id: channel.child_text("id")?,
                name: channel.child_text("name"),
            })
        })
        .collect())
}

/// Stream id of the form `"C_S"` (channel, stream type)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRef {
    pub channel: u32,
    pub stream: u32,
}

impl StreamRef {
    pub fn parse(channel_id: &str) -> Result<Self, ConnectorError> {
        let invalid = || ConnectorError::InvalidChannel(channel_id.to_string());
        let (channel, stream) = channel_id.split_once('_').ok_or_else(invalid)?;
        if !is_digits(channel) || !is_digits(stream) {
            return Err(invalid());
        }
        let channel: u32 = channel.parse().map_err(|_| invalid())?;
        let stream: u32 = stream.parse().map_err(|_| invalid())?;
        // Channels and stream types are 1-based
        if channel == 0 || stream == 0 {
            return Err(invalid());
        }
        Ok(Self { channel, stream })
    }

    /// `/Streaming/Channels/{C}0{S}`
    pub fn streaming_path(&self) -> String {
        format!("/Streaming/Channels/{}0{}", self.channel, self.stream)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
