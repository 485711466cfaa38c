//! In-process device doubles served over loopback HTTP

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use camlink::connector::onvif::soap::password_digest;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0xFF, 0xD9];

async fn bind() -> (tokio::net::TcpListener, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn serve(listener: tokio::net::TcpListener, app: Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

/// Port with nothing listening
pub async fn closed_port() -> u16 {
    let (listener, addr) = bind().await;
    drop(listener);
    addr.port()
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

// ========================================
// Hikvision ISAPI
// ========================================

/// Answer of the PTZ capabilities endpoint for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtzAnswer {
    Supported,
    ServerError,
    Stall,
}

/// ISAPI device; no channel list means a plain camera without InputProxy
pub struct IsapiDevice {
    pub channel_ids: Option<Vec<String>>,
    pub ptz: HashMap<String, PtzAnswer>,
    pub device_info_hits: AtomicUsize,
}

impl IsapiDevice {
    pub fn camera() -> Self {
        Self {
            channel_ids: None,
            ptz: HashMap::new(),
            device_info_hits: AtomicUsize::new(0),
        }
    }

    /// Recorder with channel ids "1".."n"
    pub fn recorder(channels: usize, ptz_channels: &[usize]) -> Self {
        let ids: Vec<String> = (1..=channels).map(|n| n.to_string()).collect();
        let mut device = Self::with_channel_ids(&ids);
        for n in ptz_channels {
            device = device.ptz(&n.to_string(), PtzAnswer::Supported);
        }
        device
    }

    pub fn with_channel_ids<S: AsRef<str>>(ids: &[S]) -> Self {
        Self {
            channel_ids: Some(ids.iter().map(|id| id.as_ref().to_string()).collect()),
            ..Self::camera()
        }
    }

    pub fn ptz(mut self, channel_id: &str, answer: PtzAnswer) -> Self {
        self.ptz.insert(channel_id.to_string(), answer);
        self
    }

    pub fn device_info_hits(&self) -> usize {
        self.device_info_hits.load(Ordering::SeqCst)
    }
}

fn basic_auth_ok(headers: &HeaderMap) -> bool {
    let expected = format!("Basic {}", STANDARD.encode(format!("{}:{}", USERNAME, PASSWORD)));
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str())
}

async fn isapi_device_info(State(device): State<Arc<IsapiDevice>>, headers: HeaderMap) -> Response {
    device.device_info_hits.fetch_add(1, Ordering::SeqCst);
    if !basic_auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let device_type = if device.channel_ids.is_some() { "NVR" } else { "IPCamera" };
    xml(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<DeviceInfo version="2.0" xmlns="http://www.hikvision.com/ver20/XMLSchema">
  <deviceName>Warehouse</deviceName>
  <deviceType>{}</deviceType>
  <model>DS-7604NI-K1</model>
  <serialNumber>DS-7604NI-K10420190101CCRR</serialNumber>
  <firmwareVersion>V4.22.005</firmwareVersion>
</DeviceInfo>"#,
        device_type
    ))
}

async fn isapi_channels(State(device): State<Arc<IsapiDevice>>, headers: HeaderMap) -> Response {
    if !basic_auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(ids) = &device.channel_ids else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let entries: String = ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            format!(
                "<InputProxyChannel><id>{}</id><name>Camera {:02}</name></InputProxyChannel>",
                id,
                index + 1
            )
        })
        .collect();
    xml(format!(
        r#"<InputProxyChannelList version="2.0" xmlns="http://www.hikvision.com/ver20/XMLSchema">{}</InputProxyChannelList>"#,
        entries
    ))
}

async fn isapi_ptz(
    State(device): State<Arc<IsapiDevice>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !basic_auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match device.ptz.get(&id) {
        Some(PtzAnswer::Supported) => {
            xml("<PTZChanelCap><absolutePanTiltPositionSpace/></PTZChanelCap>".to_string())
        }
        Some(PtzAnswer::ServerError) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Some(PtzAnswer::Stall) => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn isapi_picture(Path(_id): Path<String>, headers: HeaderMap) -> Response {
    if !basic_auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ([(header::CONTENT_TYPE, "image/jpeg")], JPEG).into_response()
}

pub async fn spawn_isapi(device: IsapiDevice) -> (SocketAddr, Arc<IsapiDevice>) {
    let device = Arc::new(device);
    let app = Router::new()
        .route("/ISAPI/System/deviceInfo", get(isapi_device_info))
        .route("/ISAPI/ContentMgmt/InputProxy/channels", get(isapi_channels))
        .route("/ISAPI/PTZCtrl/channels/:id/capabilities", get(isapi_ptz))
        .route("/ISAPI/Streaming/channels/:id/picture", get(isapi_picture))
        .with_state(device.clone());

    let (listener, addr) = bind().await;
    serve(listener, app);
    (addr, device)
}

// ========================================
// ONVIF
// ========================================

/// ONVIF device with a device service and an optional media service
pub struct OnvifDevice {
    pub media: bool,
    pub ptz: bool,
    pub capability_calls: AtomicUsize,
    base_url: String,
}

impl OnvifDevice {
    pub fn capability_calls(&self) -> usize {
        self.capability_calls.load(Ordering::SeqCst)
    }
}

const ENVELOPE_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl" xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema" xmlns:ter="http://www.onvif.org/ver10/error"><s:Body>"#;
const ENVELOPE_CLOSE: &str = "</s:Body></s:Envelope>";

fn soap(status: StatusCode, body: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/soap+xml; charset=utf-8")],
        format!("{}{}{}", ENVELOPE_OPEN, body, ENVELOPE_CLOSE),
    )
        .into_response()
}

fn fault(subcode: &str, reason: &str) -> Response {
    soap(
        StatusCode::BAD_REQUEST,
        &format!(
            r#"<s:Fault><s:Code><s:Value>s:Sender</s:Value><s:Subcode><s:Value>ter:{}</s:Value></s:Subcode></s:Code><s:Reason><s:Text xml:lang="en">{}</s:Text></s:Reason></s:Fault>"#,
            subcode, reason
        ),
    )
}

/// Text of the first `<tag>` or `<tag attr=...>` element in a raw body
fn element_text<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let start = body
        .find(&format!("<{}>", tag))
        .or_else(|| body.find(&format!("<{} ", tag)))?;
    let open_end = start + body[start..].find('>')? + 1;
    let close = open_end + body[open_end..].find(&format!("</{}>", tag))?;
    Some(&body[open_end..close])
}

/// Verify the WS-Security UsernameToken digest
fn ws_security_ok(body: &str) -> bool {
    let (Some(username), Some(digest), Some(nonce), Some(created)) = (
        element_text(body, "wsse:Username"),
        element_text(body, "wsse:Password"),
        element_text(body, "wsse:Nonce"),
        element_text(body, "wsu:Created"),
    ) else {
        return false;
    };
    let Ok(nonce) = STANDARD.decode(nonce) else {
        return false;
    };
    username == USERNAME && digest == password_digest(&nonce, created, PASSWORD)
}

async fn onvif_device_service(State(device): State<Arc<OnvifDevice>>, body: String) -> Response {
    if !ws_security_ok(&body) {
        return fault("NotAuthorized", "Sender not Authorized");
    }

    if body.contains("GetCapabilities") {
        device.capability_calls.fetch_add(1, Ordering::SeqCst);
        let base = &device.base_url;
        let media = if device.media {
            format!("<tt:Media><tt:XAddr>{}/onvif/media</tt:XAddr></tt:Media>", base)
        } else {
            String::new()
        };
        let ptz = if device.ptz {
            format!("<tt:PTZ><tt:XAddr>{}/onvif/ptz</tt:XAddr></tt:PTZ>", base)
        } else {
            String::new()
        };
        return soap(
            StatusCode::OK,
            &format!(
                "<tds:GetCapabilitiesResponse><tds:Capabilities><tt:Device><tt:XAddr>{base}/onvif/device_service</tt:XAddr></tt:Device><tt:Events><tt:XAddr>{base}/onvif/events</tt:XAddr></tt:Events>{media}{ptz}</tds:Capabilities></tds:GetCapabilitiesResponse>"
            ),
        );
    }
    if body.contains("GetDeviceInformation") {
        return soap(
            StatusCode::OK,
            "<tds:GetDeviceInformationResponse><tds:Manufacturer>Axis</tds:Manufacturer><tds:Model>P1448-LE</tds:Model><tds:FirmwareVersion>10.12.1</tds:FirmwareVersion><tds:SerialNumber>ACCC8E000001</tds:SerialNumber><tds:HardwareId>7A1</tds:HardwareId></tds:GetDeviceInformationResponse>",
        );
    }
    if body.contains("GetScopes") {
        return soap(
            StatusCode::OK,
            "<tds:GetScopesResponse><tds:Scopes><tt:ScopeDef>Fixed</tt:ScopeDef><tt:ScopeItem>onvif://www.onvif.org/type/video_encoder</tt:ScopeItem></tds:Scopes><tds:Scopes><tt:ScopeDef>Configurable</tt:ScopeDef><tt:ScopeItem>onvif://www.onvif.org/name/Front%20Door</tt:ScopeItem></tds:Scopes></tds:GetScopesResponse>",
        );
    }
    fault("ActionNotSupported", "Optional Action Not Implemented")
}

const PROFILES: &str = r#"<trt:GetProfilesResponse>
<trt:Profiles token="main" fixed="true">
  <tt:Name>MainStream</tt:Name>
  <tt:VideoEncoderConfiguration token="venc0">
    <tt:Name>venc0</tt:Name>
    <tt:Encoding>H264</tt:Encoding>
    <tt:Resolution><tt:Width>1920</tt:Width><tt:Height>1080</tt:Height></tt:Resolution>
    <tt:RateControl><tt:FrameRateLimit>25</tt:FrameRateLimit><tt:BitrateLimit>4096</tt:BitrateLimit></tt:RateControl>
  </tt:VideoEncoderConfiguration>
  <tt:AudioEncoderConfiguration token="aenc0"><tt:Encoding>G711</tt:Encoding></tt:AudioEncoderConfiguration>
  <tt:PTZConfiguration token="ptz0"><tt:Name>ptz0</tt:Name></tt:PTZConfiguration>
</trt:Profiles>
<trt:Profiles token="sub" fixed="true">
  <tt:Name>SubStream</tt:Name>
  <tt:VideoEncoderConfiguration token="venc1">
    <tt:Encoding>H264</tt:Encoding>
    <tt:Resolution><tt:Width>640</tt:Width><tt:Height>360</tt:Height></tt:Resolution>
    <tt:RateControl><tt:FrameRateLimit>15</tt:FrameRateLimit></tt:RateControl>
  </tt:VideoEncoderConfiguration>
</trt:Profiles>
</trt:GetProfilesResponse>"#;

async fn onvif_media_service(State(device): State<Arc<OnvifDevice>>, body: String) -> Response {
    if !ws_security_ok(&body) {
        return fault("NotAuthorized", "Sender not Authorized");
    }

    if body.contains("GetProfiles") {
        return soap(StatusCode::OK, PROFILES);
    }
    let token = element_text(&body, "trt:ProfileToken").unwrap_or_default();
    if token != "main" && token != "sub" {
        return fault("InvalidArgVal", "No such profile");
    }
    if body.contains("GetStreamUri") {
        return soap(
            StatusCode::OK,
            &format!(
                "<trt:GetStreamUriResponse><trt:MediaUri><tt:Uri>rtsp://127.0.0.1:554/{}</tt:Uri><tt:InvalidAfterConnect>false</tt:InvalidAfterConnect></trt:MediaUri></trt:GetStreamUriResponse>",
                token
            ),
        );
    }
    if body.contains("GetSnapshotUri") {
        return soap(
            StatusCode::OK,
            &format!(
                "<trt:GetSnapshotUriResponse><trt:MediaUri><tt:Uri>{}/snapshot/{}.jpg</tt:Uri></trt:MediaUri></trt:GetSnapshotUriResponse>",
                device.base_url, token
            ),
        );
    }
    fault("ActionNotSupported", "Optional Action Not Implemented")
}

async fn onvif_snapshot(Path(_name): Path<String>, headers: HeaderMap) -> Response {
    if !basic_auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ([(header::CONTENT_TYPE, "image/jpeg")], JPEG).into_response()
}

pub async fn spawn_onvif(media: bool, ptz: bool) -> (SocketAddr, Arc<OnvifDevice>) {
    let (listener, addr) = bind().await;
    let device = Arc::new(OnvifDevice {
        media,
        ptz,
        capability_calls: AtomicUsize::new(0),
        base_url: format!("http://{}", addr),
    });
    let app = Router::new()
        .route("/onvif/device_service", post(onvif_device_service))
        .route("/onvif/media", post(onvif_media_service))
        .route("/snapshot/:name", get(onvif_snapshot))
        .with_state(device.clone());

    serve(listener, app);
    (addr, device)
}
