//! Discovery engine - finds video devices without prior knowledge
//!
//! ## Phases
//!
//! 1. Subnet resolution (explicit list, local interfaces, or the default)
//! 2. Per subnet: bounded TCP port scan, then vendor identity probes on
//!    the open ports
//! 3. Once per session: WS-Discovery multicast probe
//!
//! Phases run concurrently on the calling task. Each phase's complete result
//! is merged into the session when that phase finishes, keyed by
//! `(ip, port)` with the first record winning.
//!
//! Only one session runs per engine. A second `discover` call while one is
//! active returns the candidates accumulated so far.

pub mod demo;
pub mod merge;
pub mod network;
pub mod port_scan;
pub mod transport;
pub mod types;
pub mod vendor;
pub mod ws_discovery;


use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use ipnetwork::Ipv4Network;
use tokio::sync::Semaphore;

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::models::DiscoveredCandidate;

pub use merge::merge_candidates;
pub use transport::{HttpProbeResponse, NetworkTransport, ProbeTransport};
pub use types::{DiscoveryMethod, DiscoveryRequest, DiscoveryStatus, SessionState};
pub use vendor::Vendor;

#[derive(Debug, Default)]
struct DiscoverySession {
    state: SessionState,
    candidates: Vec<DiscoveredCandidate>,
    last_started: Option<DateTime<Utc>>,
    last_completed: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Returns the session to Idle if a run is dropped before it completes
struct RunGuard<'a> {
    session: &'a Mutex<DiscoverySession>,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.state == SessionState::Running {
            session.state = SessionState::Idle;
            session.last_error = Some("discovery cancelled".to_string());
            tracing::warn!("Discovery cancelled before completion");
        }
    }
}

pub struct DiscoveryEngine {
    transport: Arc<dyn ProbeTransport>,
    config: DiscoveryConfig,
    /// Caps in-flight TCP connects across all subnets
    limiter: Semaphore,
    session: Mutex<DiscoverySession>,
}

impl DiscoveryEngine {
    pub fn new(transport: Arc<dyn ProbeTransport>, config: DiscoveryConfig) -> Self {
        let limiter = Semaphore::new(config.scan_concurrency.max(1));
        Self {
            transport,
            config,
            limiter,
            session: Mutex::new(DiscoverySession::default()),
        }
    }

    /// Engine over real sockets
    pub fn with_network(config: DiscoveryConfig) -> Self {
        Self::new(Arc::new(NetworkTransport::new()), config)
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn session(&self) -> MutexGuard<'_, DiscoverySession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> DiscoveryStatus {
        let session = self.session();
        DiscoveryStatus {
            state: session.state,
            candidate_count: session.candidates.len(),
            last_started: session.last_started,
            last_completed: session.last_completed,
            last_error: session.last_error.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.session().state == SessionState::Running
    }

    /// Candidates accumulated by the current or last session
    pub fn candidates(&self) -> Vec<DiscoveredCandidate> {
        self.session().candidates.clone()
    }

    /// Run one discovery session.
    ///
    /// Probe failures are never errors; only a failure to enumerate local
    /// interfaces is.
    pub async fn discover(&self, request: DiscoveryRequest) -> Result<Vec<DiscoveredCandidate>> {
        if let Some(partial) = self.try_begin() {
            return Ok(partial);
        }
        let mut guard = RunGuard {
            session: &self.session,
            armed: true,
        };
        let started = tokio::time::Instant::now();

        let subnets = match self.resolve_subnets(&request.subnets).await {
            Ok(subnets) => subnets,
            Err(e) => {
                guard.armed = false;
                self.fail(&e);
                return Err(e);
            }
        };
        let methods = DiscoveryMethod::resolve(&request.methods);
        let connect_timeout = self.config.port_connect_timeout.min(request.timeout / 2);

        tracing::info!(
            subnets = ?subnets.iter().map(ToString::to_string).collect::<Vec<_>>(),
            methods = ?methods,
            timeout_ms = request.timeout.as_millis() as u64,
            "Discovery started"
        );

        let mut phases: FuturesUnordered<BoxFuture<'_, Vec<DiscoveredCandidate>>> =
            FuturesUnordered::new();
        for subnet in &subnets {
            phases.push(Box::pin(self.subnet_phase(*subnet, &methods, connect_timeout)));
        }
        if methods.contains(&DiscoveryMethod::Onvif) {
            phases.push(Box::pin(ws_discovery::probe(
                self.transport.as_ref(),
                request.timeout,
                self.config.max_multicast_devices,
            )));
        }

        while let Some(batch) = phases.next().await {
            let mut session = self.session();
            let added = merge_candidates(&mut session.candidates, batch);
            tracing::debug!(added, total = session.candidates.len(), "Phase merged");
        }

        let result = self.finish();
        guard.armed = false;

        tracing::info!(
            found = result.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Discovery finished"
        );
        Ok(result)
    }

    /// Atomic Idle → Running; `Some(partial)` when a session is already active
    fn try_begin(&self) -> Option<Vec<DiscoveredCandidate>> {
        let mut session = self.session();
        if session.state == SessionState::Running {
            tracing::info!(
                candidates = session.candidates.len(),
                "Discovery already running, returning partial results"
            );
            return Some(session.candidates.clone());
        }
        session.state = SessionState::Running;
        session.candidates.clear();
        session.last_started = Some(Utc::now());
        session.last_error = None;
        None
    }

    fn finish(&self) -> Vec<DiscoveredCandidate> {
        let mut session = self.session();
        if session.candidates.is_empty() && self.config.demo_fallback {
            tracing::warn!("No devices found, injecting synthetic demo candidates");
            merge_candidates(&mut session.candidates, demo::synthetic_candidates());
        }
        session.state = SessionState::Idle;
        session.last_completed = Some(Utc::now());
        session.candidates.clone()
    }

    fn fail(&self, error: &Error) {
        tracing::error!(error = %error, "Discovery failed");
        let mut session = self.session();
        session.state = SessionState::Error;
        session.last_error = Some(error.to_string());
    }

    async fn resolve_subnets(&self, requested: &[String]) -> Result<Vec<Ipv4Network>> {
        if !requested.is_empty() {
            return Ok(requested
                .iter()
                .filter_map(|s| match network::parse_subnet(s) {
                    Ok(net) => Some(net),
                    Err(e) => {
                        tracing::warn!(subnet = %s, error = %e, "Skipping invalid subnet");
                        None
                    }
                })
                .collect());
        }

        let mut subnets = network::local_subnets().await?;
        if subnets.is_empty() {
            tracing::warn!(default = %self.config.default_subnet, "No local subnets found, using default");
            subnets.push(network::parse_subnet(&self.config.default_subnet).map_err(Error::InvalidConfig)?);
        }
        Ok(subnets)
    }

    /// Port scan then vendor probes for one subnet; vendor hits come first
    async fn subnet_phase(
        &self,
        subnet: Ipv4Network,
        methods: &[DiscoveryMethod],
        connect_timeout: Duration,
    ) -> Vec<DiscoveredCandidate> {
        let scan_selected = methods.contains(&DiscoveryMethod::Scan);
        let vendors: Vec<Vendor> = methods.iter().filter_map(DiscoveryMethod::vendor).collect();

        let mut ports: Vec<u16> = if scan_selected {
            self.config.scan_ports.clone()
        } else {
            Vec::new()
        };
        for port in vendors.iter().flat_map(|v| v.ports()) {
            if !ports.contains(port) {
                ports.push(*port);
            }
        }
        if ports.is_empty() {
            return Vec::new();
        }

        let hosts: Vec<IpAddr> = network::hosts(subnet, self.config.max_hosts_per_subnet);
        let open = port_scan::scan(
            self.transport.as_ref(),
            &self.limiter,
            &hosts,
            &ports,
            connect_timeout,
        )
        .await;

        let mut found = vendor::probe_all(
            self.transport.as_ref(),
            &open,
            &vendors,
            self.config.vendor_probe_timeout,
        )
        .await;
        if scan_selected {
            found.extend(
                open.iter()
                    .filter(|addr| self.config.scan_ports.contains(&addr.port()))
                    .map(|addr| port_scan::scan_candidate(*addr)),
            );
        }

        tracing::info!(
            subnet = %subnet,
            hosts = hosts.len(),
            open = open.len(),
            found = found.len(),
            "Subnet scanned"
        );
        found
    }
}

/// Process-wide engine over real sockets, configured from the environment
pub fn global() -> &'static DiscoveryEngine {
    static ENGINE: OnceLock<DiscoveryEngine> = OnceLock::new();
    ENGINE.get_or_init(|| DiscoveryEngine::with_network(DiscoveryConfig::from_env()))
}

/// Run discovery on the process-wide engine
pub async fn discover<M, S>(methods: &[M], subnets: &[S], timeout: Duration) -> Result<Vec<DiscoveredCandidate>>
where
    M: AsRef<str>,
    S: AsRef<str>,
{
    let request = DiscoveryRequest {
        methods: methods.iter().map(|m| m.as_ref().to_string()).collect(),
        subnets: subnets.iter().map(|s| s.as_ref().to_string()).collect(),
        timeout,
    };
    global().discover(request).await
}
