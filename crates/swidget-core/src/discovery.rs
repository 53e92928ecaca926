// ── Discovery ──
//
// Locate devices with an SSDP search and resolve one host into a typed
// device. Results are returned by value; nothing is kept process-wide.

use std::collections::BTreeMap;

use serde::Serialize;
use swidget_api::ssdp::{self, SsdpReply};
use tracing::{debug, info};

use crate::config::{DeviceConfig, DiscoveryConfig};
use crate::device::PendingDevice;
use crate::error::CoreError;
use crate::model::DeviceType;
use crate::variants::TypedDevice;

/// A device that answered a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub mac: String,
    pub host: String,
    pub friendly_name: String,
    pub device_type: Option<String>,
    pub insert_type: Option<String>,
}

impl From<SsdpReply> for DiscoveredDevice {
    fn from(reply: SsdpReply) -> Self {
        let friendly_name = match (&reply.device_type, &reply.insert_type) {
            (Some(device), Some(insert)) => format!("Swidget {device} w/{insert} insert"),
            (Some(device), None) => format!("Swidget {device}"),
            _ => "Swidget Discovered Device".to_owned(),
        };
        Self {
            mac: reply.mac,
            host: reply.host,
            friendly_name,
            device_type: reply.device_type,
            insert_type: reply.insert_type,
        }
    }
}

/// Deduplicate replies by MAC. A later reply replaces an earlier one.
pub fn collect_replies(replies: impl IntoIterator<Item = SsdpReply>) -> BTreeMap<String, DiscoveredDevice> {
    replies
        .into_iter()
        .map(|reply| {
            let device = DiscoveredDevice::from(reply);
            (device.mac.clone(), device)
        })
        .collect()
}

/// Search the local segment and return every responding device, keyed by MAC.
pub async fn discover_devices(
    config: &DiscoveryConfig,
) -> Result<BTreeMap<String, DiscoveredDevice>, CoreError> {
    let replies = ssdp::search(
        config.multicast_addr,
        &config.service_type,
        config.response_window,
    )
    .await
    .map_err(|e| CoreError::Communication {
        host: config.multicast_addr.to_string(),
        reason: e.to_string(),
        auth_failure: false,
    })?;

    let devices = collect_replies(replies);
    info!(count = devices.len(), "discovery complete");
    Ok(devices)
}

/// Resolve one host into its typed variant and run a full update.
pub async fn discover_single(config: DeviceConfig) -> Result<TypedDevice, CoreError> {
    resolve(PendingDevice::new(config)?).await
}

/// [`discover_single`] for an already-built pending device.
pub async fn resolve(pending: PendingDevice) -> Result<TypedDevice, CoreError> {
    let device = pending.fetch_summary().await?;
    let tag = device.snapshot().device_type_tag().to_owned();
    if DeviceType::from_tag(&tag).is_none() {
        return Err(CoreError::UnknownDeviceType { device_type: tag });
    }
    debug!(host = %device.host(), device_type = %tag, "resolved device type");

    device.update().await?;
    TypedDevice::from_device(device)
}
