//! Probe transport - the network primitives discovery is built on
//!
//! The engine only talks to the network through [`ProbeTransport`], so probes
//! can be pointed at in-memory doubles.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout, Instant};

/// Multicast TTL for discovery probes
pub const MULTICAST_TTL: u32 = 4;

const RECV_BUFFER_SIZE: usize = 8192;

/// Status and body of an unauthenticated probe GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbeResponse {
    pub status: u16,
    pub body: String,
}

/// Reply sink for `multicast_exchange`; return `false` to stop listening
pub type ReplySink<'a> = &'a mut (dyn FnMut(SocketAddr, &[u8]) -> bool + Send);

#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// `true` when a TCP connection was accepted within `timeout`
    async fn tcp_connect(&self, addr: SocketAddr, timeout: Duration) -> bool;

    /// `None` on connect failure or timeout
    async fn http_get(&self, url: &str, timeout: Duration) -> Option<HttpProbeResponse>;

    /// Send one datagram to `group` and feed every reply to `on_reply`
    /// until `window` elapses or the sink asks to stop
    async fn multicast_exchange(
        &self,
        payload: &[u8],
        group: SocketAddr,
        window: Duration,
        on_reply: ReplySink<'_>,
    ) -> std::io::Result<()>;
}

/// Real sockets
pub struct NetworkTransport {
    http: reqwest::Client,
}

impl NetworkTransport {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");
        Self { http }
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeTransport for NetworkTransport {
    async fn tcp_connect(&self, addr: SocketAddr, connect_timeout: Duration) -> bool {
        // Connect then drop: open port, nothing else
        matches!(
            timeout(connect_timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    async fn http_get(&self, url: &str, request_timeout: Duration) -> Option<HttpProbeResponse> {
        let response = match self.http.get(url).timeout(request_timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::trace!(url = %url, error = %e, "Probe GET failed");
                return None;
            }
        };
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Some(HttpProbeResponse { status, body })
    }

    async fn multicast_exchange(
        &self,
        payload: &[u8],
        group: SocketAddr,
        window: Duration,
        on_reply: ReplySink<'_>,
    ) -> std::io::Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
        socket.send_to(payload, group).await?;

        let deadline = Instant::now() + window;
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, socket.recv_from(&mut buffer)).await {
                Ok(Ok((size, from))) => {
                    if !on_reply(from, &buffer[..size]) {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Multicast receive error");
                }
                Err(_) => break,
            }
        }
        Ok(())
    }
}
