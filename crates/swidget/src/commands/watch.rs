//! `swidget watch`: follow state changes over push or polling.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use swidget_core::{ChannelState, CoreError, Device, DeviceConfig, DeviceSnapshot, StopReason};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// Polling interval used by `--poll` when the profile disables polling.
const FALLBACK_POLL_SECS: u64 = 10;

#[derive(Serialize)]
struct WatchEvent<'a> {
    at: String,
    is_on: Option<bool>,
    brightness: Option<u8>,
    total_power: Option<f64>,
    snapshot: &'a DeviceSnapshot,
}

fn render_event(snapshot: &DeviceSnapshot, global: &GlobalOpts, color: bool) -> Result<String, CliError> {
    let event = WatchEvent {
        at: Utc::now().to_rfc3339(),
        is_on: snapshot.is_on(),
        brightness: snapshot.brightness(),
        total_power: snapshot.total_power(),
        snapshot,
    };
    match global.output {
        // One line per event keeps the stream greppable.
        OutputFormat::Json | OutputFormat::JsonCompact => Ok(serde_json::to_string(&event)?),
        _ => {
            let mut line = format!(
                "{}  {}",
                event.at,
                output::power_label(event.is_on, color)
            );
            if let Some(level) = event.brightness {
                line.push_str(&format!("  {level}%"));
            }
            if let Some(watts) = event.total_power {
                line.push_str(&format!("  {watts:.1} W"));
            }
            Ok(line)
        }
    }
}

pub async fn handle(
    mut config: DeviceConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.poll {
        config.websocket_enabled = false;
        if config.poll_interval_secs == 0 {
            config.poll_interval_secs = FALLBACK_POLL_SECS;
        }
    }

    let device = Device::connect(config).await?;
    let result = follow(&device, args.count, global).await;
    device.close().await;
    result
}

async fn follow(device: &Device, count: Option<usize>, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let mut snapshots = device.subscribe();
    // Never fires when polling; the sender lives as long as the device.
    let (_idle_tx, idle_rx) = watch::channel(ChannelState::Disconnected);
    let mut channel = device.connection_updates().await.unwrap_or(idle_rx);

    output::print_output(&render_event(snapshots.current(), global, color)?, global.quiet);

    let mut seen = 0usize;
    let mut channel_open = true;
    loop {
        if count.is_some_and(|n| seen >= n) {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),

            snapshot = snapshots.changed() => {
                let Some(snapshot): Option<Arc<DeviceSnapshot>> = snapshot else {
                    return Ok(());
                };
                output::print_output(&render_event(&snapshot, global, color)?, global.quiet);
                seen += 1;
            }

            changed = channel.changed(), if channel_open => {
                if changed.is_err() {
                    channel_open = false;
                    continue;
                }
                let state = *channel.borrow_and_update();
                tracing::info!(host = %device.host(), ?state, "push channel state");
                if state == ChannelState::Stopped {
                    let reason = device
                        .channel_stop_reason()
                        .await
                        .unwrap_or(StopReason::Unknown);
                    if reason == StopReason::Closed {
                        return Ok(());
                    }
                    return Err(CoreError::ChannelStopped { reason }.into());
                }
            }
        }
    }
}
