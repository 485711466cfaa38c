//! ONVIF response types parsed from SOAP envelopes

use crate::xml::XmlElement;

const NAME_SCOPE: &str = "onvif://www.onvif.org/name/";

/// Service endpoints from GetCapabilities; absent means the service is disabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnvifServices {
    pub device_xaddr: Option<String>,
    pub media_xaddr: Option<String>,
    pub ptz_xaddr: Option<String>,
    pub events_xaddr: Option<String>,
}

impl OnvifServices {
    pub fn from_response(root: &XmlElement) -> Self {
        let capabilities = root
            .descendant("GetCapabilitiesResponse")
            .and_then(|r| r.child("Capabilities"))
            .or_else(|| root.descendant("Capabilities"));
        let xaddr = |service: &str| {
            capabilities
                .and_then(|c| c.child(service))
                .and_then(|s| s.child_text("XAddr"))
        };
        Self {
            device_xaddr: xaddr("Device"),
            media_xaddr: xaddr("Media"),
            ptz_xaddr: xaddr("PTZ"),
            events_xaddr: xaddr("Events"),
        }
    }
}

/// GetDeviceInformation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnvifDeviceInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub serial_number: Option<String>,
    pub hardware_id: Option<String>,
}

impl OnvifDeviceInfo {
    pub fn from_response(root: &XmlElement) -> Self {
        let info = root.descendant("GetDeviceInformationResponse").unwrap_or(root);
        Self {
            manufacturer: info.descendant_text("Manufacturer"),
            model: info.descendant_text("Model"),
            firmware_version: info.descendant_text("FirmwareVersion"),
            serial_number: info.descendant_text("SerialNumber"),
            hardware_id: info.descendant_text("HardwareId"),
        }
    }

    /// "Manufacturer Model", used when the device has no name scope
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.manufacturer.as_deref(), self.model.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            "ONVIF Device".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Friendly name from the `onvif://www.onvif.org/name/...` scope of GetScopes
pub fn scope_name(root: &XmlElement) -> Option<String> {
    name_from_scopes(
        root.descendants("ScopeItem")
            .into_iter()
            .filter_map(XmlElement::text),
    )
}

/// Decoded name from a list of scope URIs
pub fn name_from_scopes<I, S>(scopes: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    scopes.into_iter().find_map(|scope| {
        scope
            .as_ref()
            .strip_prefix(NAME_SCOPE)
            .map(percent_decode)
            .filter(|name| !name.is_empty())
    })
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(b) = s.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Video encoder settings of a media profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoEncoder {
    pub encoding: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate_limit: Option<u32>,
}

impl VideoEncoder {
    fn from_xml(config: &XmlElement) -> Self {
        let resolution = config.child("Resolution");
        let dimension = |name: &str| {
            resolution
                .and_then(|r| r.child_text(name))
                .and_then(|v| v.parse().ok())
        };
        Self {
            encoding: config.child_text("Encoding"),
            width: dimension("Width"),
            height: dimension("Height"),
            frame_rate_limit: config
                .path(&["RateControl", "FrameRateLimit"])
                .and_then(XmlElement::text)
                .and_then(|v| v.parse().ok()),
        }
    }

    /// "WxH" when both dimensions are known
    pub fn resolution(&self) -> Option<String> {
        Some(format!("{}x{}", self.width?, self.height?))
    }
}

/// One media profile from GetProfiles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaProfile {
    pub token: String,
    pub name: String,
    pub video_encoder: Option<VideoEncoder>,
    pub has_audio_encoder: bool,
    pub has_ptz_configuration: bool,
}

/// Profiles without a token cannot be addressed and are skipped
pub fn parse_profiles(root: &XmlElement) -> Vec<MediaProfile> {
    root.descendants("Profiles")
        .into_iter()
        .filter_map(|profile| {
            let token = profile.attribute("token")?.to_string();
            Some(MediaProfile {
                name: profile.child_text("Name").unwrap_or_else(|| token.clone()),
                video_encoder: profile
                    .child("VideoEncoderConfiguration")
                    .map(VideoEncoder::from_xml),
                has_audio_encoder: profile.child("AudioEncoderConfiguration").is_some(),
                has_ptz_configuration: profile.child("PTZConfiguration").is_some(),
                token,
            })
        })
        .collect()
}

/// `MediaUri/Uri` of GetStreamUri or GetSnapshotUri
pub fn media_uri(root: &XmlElement) -> Option<String> {
    root.descendant("MediaUri")
        .and_then(|m| m.child_text("Uri"))
        .or_else(|| root.descendant_text("Uri"))
}

/// Profile tokens are opaque but must be safe to embed in a request body
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && !token
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | '&' | '"' | '\''))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema">
<s:Body><trt:GetProfilesResponse>
  <trt:Profiles token="main" fixed="true">
    <tt:Name>MainStream</tt:Name>
    <tt:VideoEncoderConfiguration token="venc0">
      <tt:Name>venc0</tt:Name>
      <tt:Encoding>H264</tt:Encoding>
      <tt:Resolution><tt:Width>1920</tt:Width><tt:Height>1080</tt:Height></tt:Resolution>
      <tt:RateControl><tt:FrameRateLimit>25</tt:FrameRateLimit><tt:BitrateLimit>4096</tt:BitrateLimit></tt:RateControl>
    </tt:VideoEncoderConfiguration>
    <tt:AudioEncoderConfiguration token="aenc0"><tt:Encoding>G711</tt:Encoding></tt:AudioEncoderConfiguration>
    <tt:PTZConfiguration token="ptz0"/>
  </trt:Profiles>
  <trt:Profiles token="sub">
    <tt:Name>SubStream</tt:Name>
    <tt:VideoEncoderConfiguration token="venc1"><tt:Encoding>H264</tt:Encoding></tt:VideoEncoderConfiguration>
  </trt:Profiles>
</trt:GetProfilesResponse></s:Body></s:Envelope>"#;

    #[test]
    fn test_parse_profiles() {
        let root = XmlElement::parse(PROFILES).unwrap();
        let profiles = parse_profiles(&root);
        assert_eq!(profiles.len(), 2);

        let main = &profiles[0];
        assert_eq!(main.token, "main");
        assert_eq!(main.name, "MainStream");
        let video = main.video_encoder.as_ref().unwrap();
        assert_eq!(video.resolution().as_deref(), Some("1920x1080"));
        assert_eq!(video.frame_rate_limit, Some(25));
        assert_eq!(video.encoding.as_deref(), Some("H264"));
        assert!(main.has_audio_encoder);
        assert!(main.has_ptz_configuration);

        let sub = &profiles[1];
        assert_eq!(sub.video_encoder.as_ref().unwrap().resolution(), None);
        assert!(!sub.has_audio_encoder);
        assert!(!sub.has_ptz_configuration);
    }

    #[test]
    fn test_services_with_missing_ptz() {
        let xml = r#"<Envelope><Body><GetCapabilitiesResponse><Capabilities>
  <Device><XAddr>http://10.0.0.9/onvif/device_service</XAddr></Device>
  <Media><XAddr>http://10.0.0.9/onvif/media_service</XAddr><StreamingCapabilities/></Media>
  <Events><XAddr>http://10.0.0.9/onvif/events</XAddr></Events>
</Capabilities></GetCapabilitiesResponse></Body></Envelope>"#;
        let services = OnvifServices::from_response(&XmlElement::parse(xml).unwrap());
        assert_eq!(services.media_xaddr.as_deref(), Some("http://10.0.0.9/onvif/media_service"));
        assert!(services.ptz_xaddr.is_none());
        assert!(services.events_xaddr.is_some());
    }

    #[test]
    fn test_scope_name() {
        let xml = r#"<Envelope><Body><GetScopesResponse>
  <Scopes><ScopeDef>Fixed</ScopeDef><ScopeItem>onvif://www.onvif.org/type/video_encoder</ScopeItem></Scopes>
  <Scopes><ScopeDef>Configurable</ScopeDef><ScopeItem>onvif://www.onvif.org/name/Front%20Door</ScopeItem></Scopes>
</GetScopesResponse></Body></Envelope>"#;
        assert_eq!(
            scope_name(&XmlElement::parse(xml).unwrap()).as_deref(),
            Some("Front Door")
        );
    }

    #[test]
    fn test_display_name_fallback() {
        let info = OnvifDeviceInfo {
            manufacturer: Some("ACME".to_string()),
            model: Some("IPC-1".to_string()),
            ..Default::default()
        };
        assert_eq!(info.display_name(), "ACME IPC-1");
        assert_eq!(OnvifDeviceInfo::default().display_name(), "ONVIF Device");
    }

    #[test]
    fn test_token_validation() {
        assert!(is_valid_token("Profile_1"));
        assert!(is_valid_token("000"));
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("main stream"));
        assert!(!is_valid_token("<x>"));
    }
}
