//! `swidget discover`: SSDP search on the local segment.

use std::time::Duration;

use tabled::Tabled;
use swidget_core::{DiscoveredDevice, DiscoveryConfig, discover_devices};

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Insert")]
    insert_type: String,
}

impl From<&DiscoveredDevice> for DiscoveredRow {
    fn from(d: &DiscoveredDevice) -> Self {
        Self {
            mac: d.mac.clone(),
            host: d.host.clone(),
            name: d.friendly_name.clone(),
            device_type: d.device_type.clone().unwrap_or_else(|| "-".into()),
            insert_type: d.insert_type.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

pub async fn handle(args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.window == 0 {
        return Err(CliError::Validation {
            field: "window".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let mut config = DiscoveryConfig {
        response_window: Duration::from_secs(args.window),
        ..DiscoveryConfig::default()
    };
    if let Some(st) = args.service_type {
        config.service_type = st;
    }

    let found: Vec<DiscoveredDevice> = discover_devices(&config).await?.into_values().collect();
    if found.is_empty() {
        if !global.quiet {
            eprintln!("No devices answered within {}s", args.window);
        }
        return Ok(());
    }

    let out = output::render_list(
        &global.output,
        &found,
        |d| DiscoveredRow::from(d),
        |d| d.host.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
