//! ONVIF driver
//!
//! Talks SOAP 1.2 to the device service at `/onvif/device_service`, then to
//! the media service advertised by GetCapabilities. Requests carry a
//! WS-Security UsernameToken digest when a username is configured.

pub mod soap;
pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use quick_xml::escape::escape;
use serde_json::Value;

use self::soap::{SoapClient, NS_DEVICE, NS_MEDIA, NS_SCHEMA};
use self::types::{
    is_valid_token, media_uri, parse_profiles, scope_name, MediaProfile, OnvifDeviceInfo,
    OnvifServices,
};
use super::{http_base_url, http_client, Connector, ConnectorParams, ConnectorRegistry};
use crate::error::{ConnectorError, ConnectorResult, Result};
use crate::models::{DeviceDescriptor, DeviceStatus, StreamDescriptor, StreamTransport};
use crate::xml::XmlElement;

pub const CONNECTOR_TYPE: &str = "onvif";

const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

pub fn register(registry: &mut ConnectorRegistry) -> Result<()> {
    registry.register(CONNECTOR_TYPE, create)
}

fn create(params: ConnectorParams) -> Box<dyn Connector> {
    Box::new(OnvifConnector::new(params))
}

/// Established session: SOAP client plus the advertised service endpoints
struct Session {
    soap: SoapClient,
    services: OnvifServices,
}

pub struct OnvifConnector {
    params: ConnectorParams,
    device_service_url: String,
    session: Option<Session>,
}

impl OnvifConnector {
    pub fn new(params: ConnectorParams) -> Self {
        let device_service_url = format!("{}{}", http_base_url(&params), DEVICE_SERVICE_PATH);
        Self {
            params,
            device_service_url,
            session: None,
        }
    }

    /// Service endpoints discovered by the last `connect`
    pub fn services(&self) -> Option<&OnvifServices> {
        self.session.as_ref().map(|s| &s.services)
    }

    fn session(&self) -> ConnectorResult<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| ConnectorError::NotConnected(self.device_service_url.clone()))
    }

    fn media_url(&self) -> ConnectorResult<String> {
        self.session()?
            .services
            .media_xaddr
            .clone()
            .ok_or_else(|| ConnectorError::Unsupported("device exposes no media service".to_string()))
    }

    async fn device_call(&self, action: &str, body: &str) -> ConnectorResult<XmlElement> {
        let session = self.session()?;
        let url = session
            .services
            .device_xaddr
            .as_deref()
            .unwrap_or(&self.device_service_url);
        session.soap.call(url, action, body).await
    }

    async fn media_call(&self, action: &str, body: &str) -> ConnectorResult<XmlElement> {
        let url = self.media_url()?;
        self.session()?.soap.call(&url, action, body).await
    }

    async fn fetch_profiles(&self) -> ConnectorResult<Vec<MediaProfile>> {
        let body = format!(r#"<trt:GetProfiles xmlns:trt="{NS_MEDIA}"/>"#);
        let response = self.media_call("GetProfiles", &body).await?;
        Ok(parse_profiles(&response))
    }

    async fn fetch_stream_uri(&self, token: &str) -> ConnectorResult<String> {
        let body = format!(
            r#"<trt:GetStreamUri xmlns:trt="{NS_MEDIA}" xmlns:tt="{NS_SCHEMA}"><trt:StreamSetup><tt:Stream>RTP-Unicast</tt:Stream><tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport></trt:StreamSetup><trt:ProfileToken>{}</trt:ProfileToken></trt:GetStreamUri>"#,
            escape(token)
        );
        let response = self.media_call("GetStreamUri", &body).await?;
        media_uri(&response)
            .ok_or_else(|| ConnectorError::Malformed("GetStreamUri: no MediaUri".to_string()))
    }

    async fn fetch_snapshot_uri(&self, token: &str) -> ConnectorResult<String> {
        let body = format!(
            r#"<trt:GetSnapshotUri xmlns:trt="{NS_MEDIA}"><trt:ProfileToken>{}</trt:ProfileToken></trt:GetSnapshotUri>"#,
            escape(token)
        );
        let response = self.media_call("GetSnapshotUri", &body).await?;
        media_uri(&response)
            .ok_or_else(|| ConnectorError::Malformed("GetSnapshotUri: no MediaUri".to_string()))
    }

    async fn fetch_name(&self) -> Option<String> {
        let body = format!(r#"<tds:GetScopes xmlns:tds="{NS_DEVICE}"/>"#);
        match self.device_call("GetScopes", &body).await {
            Ok(response) => scope_name(&response),
            Err(e) => {
                tracing::debug!(ip = %self.params.ip_address, error = %e, "GetScopes failed");
                None
            }
        }
    }

    fn stream(&self, index: usize, profile: &MediaProfile, url: String, ptz_service: bool) -> StreamDescriptor {
        let video = profile.video_encoder.as_ref();
        StreamDescriptor {
            id: profile.token.clone(),
            name: profile.name.clone(),
            url,
            transport: StreamTransport::Rtsp,
            channel: index as u32 + 1,
            resolution: video.and_then(|v| v.resolution()),
            fps: video.and_then(|v| v.frame_rate_limit),
            encoding: video.and_then(|v| v.encoding.clone()),
            ptz_capable: ptz_service && profile.has_ptz_configuration,
            audio_capable: profile.has_audio_encoder,
            device_id: self.params.device_id.clone(),
        }
    }
}

fn check_token(token: &str) -> ConnectorResult<()> {
    if is_valid_token(token) {
        Ok(())
    } else {
        Err(ConnectorError::InvalidChannel(token.to_string()))
    }
}

#[async_trait]
impl Connector for OnvifConnector {
    fn connector_type(&self) -> &'static str {
        CONNECTOR_TYPE
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn device_id(&self) -> &str {
        &self.params.device_id
    }

    async fn connect(&mut self) -> ConnectorResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let soap = SoapClient::new(
            http_client(&self.params),
            &self.params.username,
            &self.params.password,
        );
        let body = format!(
            r#"<tds:GetCapabilities xmlns:tds="{NS_DEVICE}"><tds:Category>All</tds:Category></tds:GetCapabilities>"#
        );
        let response = match soap
            .call(&self.device_service_url, "GetCapabilities", &body)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(ip = %self.params.ip_address, port = self.params.port, error = %e, "ONVIF connect failed");
                return Err(e);
            }
        };

        let services = OnvifServices::from_response(&response);
        tracing::info!(
            device_id = %self.params.device_id,
            ip = %self.params.ip_address,
            media = services.media_xaddr.is_some(),
            ptz = services.ptz_xaddr.is_some(),
            events = services.events_xaddr.is_some(),
            "ONVIF connected"
        );
        self.session = Some(Session { soap, services });
        Ok(())
    }

    async fn disconnect(&mut self) -> ConnectorResult<()> {
        if self.session.take().is_some() {
            tracing::debug!(device_id = %self.params.device_id, "ONVIF disconnected");
        }
        Ok(())
    }

    async fn get_device_info(&mut self) -> ConnectorResult<DeviceDescriptor> {
        self.connect().await?;

        let body = format!(r#"<tds:GetDeviceInformation xmlns:tds="{NS_DEVICE}"/>"#);
        let response = self.device_call("GetDeviceInformation", &body).await?;
        let info = OnvifDeviceInfo::from_response(&response);
        let name = self.fetch_name().await.unwrap_or_else(|| info.display_name());

        let services = self.session()?.services.clone();
        let channel_count = if services.media_xaddr.is_some() {
            match self.fetch_profiles().await {
                Ok(profiles) => profiles.len() as u32,
                Err(e) => {
                    tracing::debug!(ip = %self.params.ip_address, error = %e, "GetProfiles failed");
                    0
                }
            }
        } else {
            0
        };

        let capabilities = BTreeMap::from([
            ("ptz".to_string(), Value::Bool(services.ptz_xaddr.is_some())),
            ("events".to_string(), Value::Bool(services.events_xaddr.is_some())),
            ("media".to_string(), Value::Bool(services.media_xaddr.is_some())),
        ]);

        Ok(DeviceDescriptor {
            id: self.params.device_id.clone(),
            name,
            model: info.model.unwrap_or_else(|| "Unknown Model".to_string()),
            manufacturer: info.manufacturer.unwrap_or_else(|| "Unknown".to_string()),
            ip_address: self.params.ip_address.clone(),
            port: self.params.port,
            firmware: info.firmware_version,
            serial_number: info.serial_number,
            channel_count,
            status: DeviceStatus::Online,
            last_seen: Some(Utc::now()),
            capabilities,
        })
    }

    async fn list_streams(&mut self) -> ConnectorResult<Vec<StreamDescriptor>> {
        self.connect().await?;
        self.media_url()?;

        let ptz_service = self.session()?.services.ptz_xaddr.is_some();
        let profiles = self.fetch_profiles().await?;

        let mut streams = Vec::with_capacity(profiles.len());
        for (index, profile) in profiles.iter().enumerate() {
            let url = self.fetch_stream_uri(&profile.token).await?;
            streams.push(self.stream(index, profile, url, ptz_service));
        }

        tracing::debug!(device_id = %self.params.device_id, streams = streams.len(), "ONVIF streams listed");
        Ok(streams)
    }

    async fn get_stream_url(&mut self, channel_id: &str) -> ConnectorResult<String> {
        check_token(channel_id)?;
        self.connect().await?;
        self.fetch_stream_uri(channel_id).await
    }

    async fn snapshot(&mut self, channel_id: &str) -> ConnectorResult<Bytes> {
        check_token(channel_id)?;
        self.connect().await?;

        let uri = self.fetch_snapshot_uri(channel_id).await?;
        let soap = &self.session()?.soap;
        let response = soap
            .http()
            .get(&uri)
            .basic_auth(soap.username(), Some(soap.password()))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ConnectorError::from_status(response.status(), "snapshot"));
        }
        let image = response.bytes().await?;

        tracing::debug!(device_id = %self.params.device_id, profile = %channel_id, size = image.len(), "Snapshot captured");
        Ok(image)
    }
}
