//! CLI configuration: thin wrapper around `swidget_config` shared types.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` flag overrides (--host, --secret, --insecure, --timeout).

use std::time::Duration;

use secrecy::SecretString;

use swidget_core::{DeviceConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use swidget_config::{
    Config, Defaults, Profile, config_path, load_config_or_default, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `DeviceConfig` from the config file, profile, and CLI overrides.
pub fn build_device_config(global: &GlobalOpts) -> Result<DeviceConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, &cfg.defaults, global);
    }

    // An explicitly requested profile must exist.
    if global.profile.is_some() && global.host.is_none() {
        let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
        available.sort();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    // No profile: build from flags / env alone.
    let host = global.host.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let secret = global
        .secret
        .clone()
        .map(SecretString::from)
        .ok_or(CliError::NoCredentials {
            profile: profile_name,
        })?;

    let mut config = DeviceConfig::new(host, secret);
    config.tls = if global.insecure || cfg.defaults.insecure {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };
    config.timeout = Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout));
    config.websocket_enabled = cfg.defaults.websocket;
    config.poll_interval_secs = cfg.defaults.poll_interval;
    Ok(config)
}

/// Translate a `Profile` + global flags into a `DeviceConfig`.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    global: &GlobalOpts,
) -> Result<DeviceConfig, CliError> {
    let mut profile = profile.clone();
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(ref secret) = global.secret {
        profile.secret = Some(secret.clone());
    }
    if global.insecure {
        profile.insecure = Some(true);
        profile.ca_cert = None;
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let mut config = swidget_config::profile_to_device_config(&profile, profile_name, defaults)?;
    // The flag beats the keyring and env steps of the chain.
    if let Some(ref secret) = global.secret {
        config.secret = SecretString::from(secret.clone());
    }
    Ok(config)
}
