// ── Core error types ──
//
// User-facing errors from swidget-core. Callers never see HTTP status
// codes or JSON parse failures directly: every REST failure collapses
// into `Communication`, which callers treat as transient and retry on
// their next cycle.

use thiserror::Error;

use swidget_api::StopReason;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device communication ─────────────────────────────────────────
    #[error("Cannot communicate with device at {host}: {reason}")]
    Communication {
        host: String,
        reason: String,
        /// `true` when the device rejected the secret key.
        auth_failure: bool,
    },

    #[error("WebSocket channel stopped: {reason}")]
    ChannelStopped { reason: StopReason },

    // ── Device model ─────────────────────────────────────────────────
    #[error("Unknown device type: {device_type}")]
    UnknownDeviceType { device_type: String },

    #[error("Device has no function {path}")]
    UnknownFunction { path: String },

    #[error("Operation not supported: {operation} (requires {required})")]
    Unsupported { operation: String, required: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Attach the device host to a transport error.
    pub(crate) fn communication(host: &str, err: &swidget_api::Error) -> Self {
        Self::Communication {
            host: host.to_owned(),
            reason: err.to_string(),
            auth_failure: err.is_auth_failure(),
        }
    }

    /// Returns `true` if retrying on the next cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Communication { auth_failure: false, .. })
    }

    /// Returns `true` if the device rejected the configured secret.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Communication { auth_failure: true, .. }
                | Self::ChannelStopped {
                    reason: StopReason::AuthorizationFailure
                }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<swidget_api::Error> for CoreError {
    fn from(err: swidget_api::Error) -> Self {
        match err {
            swidget_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid device address: {e}"),
            },
            swidget_api::Error::InvalidSecret(e) => CoreError::Config {
                message: format!("Secret key is not a valid header value: {e}"),
            },
            swidget_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS setup failed: {msg}"),
            },
            other => CoreError::Communication {
                host: String::new(),
                reason: other.to_string(),
                auth_failure: other.is_auth_failure(),
            },
        }
    }
}
