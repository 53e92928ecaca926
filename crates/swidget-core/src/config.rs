// ── Runtime device configuration ──
//
// These types describe *how* to reach a device. They carry the secret
// and connection tuning, but never touch disk: the CLI builds a
// `DeviceConfig` (usually from a swidget-config profile) and hands it in.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use swidget_api::ReconnectPolicy;
use url::Url;
use swidget_api::ssdp::{SSDP_MULTICAST_ADDR, SWIDGET_SERVICE_TYPE};
use swidget_api::transport::{TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification. Devices ship self-signed certificates.
    #[default]
    DangerAcceptInvalid,
}

/// Configuration for talking to a single device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device address (`192.168.1.20`, `swidget-kitchen.local`).
    pub host: String,
    /// Shared secret, sent as `x-secret-key`.
    pub secret: SecretString,
    pub tls: TlsVerification,
    /// REST request timeout.
    pub timeout: Duration,
    /// Open the WebSocket push channel after the initial update.
    pub websocket_enabled: bool,
    /// Polling interval when the push channel is not used (seconds). 0 = never.
    pub poll_interval_secs: u64,
    /// Backoff policy for the push channel.
    pub reconnect: ReconnectPolicy,
    /// Push channel URL override. `None` derives `wss://{host}/api/v1/sock`.
    pub websocket_url: Option<Url>,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>, secret: SecretString) -> Self {
        Self {
            host: host.into(),
            secret,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            websocket_enabled: true,
            poll_interval_secs: 10,
            reconnect: ReconnectPolicy::default(),
            websocket_url: None,
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }

    pub(crate) fn push_url(&self) -> Result<Url, swidget_api::Error> {
        match &self.websocket_url {
            Some(url) => Ok(url.clone()),
            None => swidget_api::WebSocketChannel::device_url(&self.host, &self.secret),
        }
    }
}

/// Configuration for an SSDP search.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// `ST` token the devices answer to.
    pub service_type: String,
    /// How long to collect replies.
    pub response_window: Duration,
    /// Where the M-SEARCH is sent.
    pub multicast_addr: SocketAddr,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: SWIDGET_SERVICE_TYPE.into(),
            response_window: Duration::from_secs(5),
            multicast_addr: SSDP_MULTICAST_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([239, 255, 255, 250], 1900))),
        }
    }
}
