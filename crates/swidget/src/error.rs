//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use swidget_config::ConfigError;
use swidget_core::{CoreError, StopReason};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not communicate with device at {host}: {reason}")]
    #[diagnostic(
        code(swidget::connection_failed),
        help(
            "Check that the device is powered and reachable.\n\
             Host: {host}\n\
             Try: swidget ping --insecure"
        )
    )]
    ConnectionFailed { host: String, reason: String },

    #[error("WebSocket channel stopped: {reason}")]
    #[diagnostic(
        code(swidget::channel_stopped),
        help("Retry later, or use `swidget watch --poll` to fall back to REST polling.")
    )]
    ChannelStopped { reason: StopReason },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Device rejected the secret key")]
    #[diagnostic(
        code(swidget::auth_failed),
        help(
            "Verify the device secret key.\n\
             Run: swidget config set-secret --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No secret key configured for profile '{profile}'")]
    #[diagnostic(
        code(swidget::no_credentials),
        help(
            "Configure one with: swidget config init\n\
             Or set the SWIDGET_SECRET environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Device capability ────────────────────────────────────────────
    #[error("Unknown device type '{device_type}'")]
    #[diagnostic(
        code(swidget::unknown_device_type),
        help("Supported types: outlet, switch, dimmer, timer_switch")
    )]
    UnknownDeviceType { device_type: String },

    #[error("Device has no function '{path}'")]
    #[diagnostic(code(swidget::unknown_function))]
    UnknownFunction { path: String },

    #[error("Operation '{operation}' is not supported by this device")]
    #[diagnostic(code(swidget::unsupported), help("This command requires {required}."))]
    Unsupported { operation: String, required: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(swidget::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(swidget::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: swidget config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device configured")]
    #[diagnostic(
        code(swidget::no_config),
        help(
            "Create a profile with: swidget config init\n\
             Or pass --host and --secret.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(swidget::config))]
    Config { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    #[diagnostic(code(swidget::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ChannelStopped { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } | Self::NoConfig { .. } => exit_code::NOT_FOUND,
            Self::UnknownDeviceType { .. }
            | Self::UnknownFunction { .. }
            | Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Communication {
                auth_failure: true, ..
            } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::Communication { host, reason, .. } => {
                CliError::ConnectionFailed { host, reason }
            }

            CoreError::ChannelStopped {
                reason: StopReason::AuthorizationFailure,
            } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::ChannelStopped { reason } => CliError::ChannelStopped { reason },

            CoreError::UnknownDeviceType { device_type } => {
                CliError::UnknownDeviceType { device_type }
            }

            CoreError::UnknownFunction { path } => CliError::UnknownFunction { path },

            CoreError::Unsupported {
                operation,
                required,
            } => CliError::Unsupported {
                operation,
                required,
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Config { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
