// ── Device facade ──
//
// Lifecycle management for one device: initial snapshot, periodic
// polling or WebSocket push, command routing, and derived reads over
// the DeviceStore.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use swidget_api::models::{AssemblyKind, FunctionPath};
use swidget_api::{ChannelState, DeviceClient, InboundMessage, StopReason, WebSocketChannel};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::model::{Capabilities, DeviceType, HardwareInfo, RealtimeValue};
use crate::store::{DeviceSnapshot, DeviceStore, PRIMARY_COMPONENT, USB_COMPONENT};
use crate::stream::SnapshotStream;

// ── PendingDevice ────────────────────────────────────────────────────

/// A device whose structure is not known yet.
///
/// Only [`fetch_summary`](Self::fetch_summary) is available; it yields a
/// [`Device`] that always holds a complete snapshot.
pub struct PendingDevice {
    config: DeviceConfig,
    client: DeviceClient,
}

impl PendingDevice {
    /// Build the transport session for `config.host`. Does NOT connect.
    pub fn new(config: DeviceConfig) -> Result<Self, CoreError> {
        let client = DeviceClient::new(&config.host, &config.secret, &config.transport())?;
        Ok(Self { config, client })
    }

    /// Use a pre-built client (shared pool, test server, ...).
    pub fn with_client(config: DeviceConfig, client: DeviceClient) -> Self {
        Self { config, client }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// GET the summary and build the device from it.
    pub async fn fetch_summary(&self) -> Result<Device, CoreError> {
        let summary = self
            .client
            .summary()
            .await
            .map_err(|e| CoreError::communication(&self.config.host, &e))?;
        debug!(
            host = %self.config.host,
            device_type = %summary.host.kind,
            insert_type = %summary.insert.kind,
            "summary received"
        );
        let snapshot = DeviceSnapshot::from_summary(&summary, None);
        Ok(Device::from_parts(
            self.config.clone(),
            self.client.clone(),
            snapshot,
        ))
    }
}

// ── Device ───────────────────────────────────────────────────────────

/// A device with a known structure.
///
/// Cheaply cloneable via `Arc<DeviceInner>`; all clones share the store,
/// the transport session and the push channel.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    config: DeviceConfig,
    client: DeviceClient,
    store: DeviceStore,
    /// Serializes REST update cycles.
    update_lock: Mutex<()>,
    channel: Mutex<Option<WebSocketChannel>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Device {
    fn from_parts(config: DeviceConfig, client: DeviceClient, snapshot: DeviceSnapshot) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                config,
                client,
                store: DeviceStore::new(snapshot),
                update_lock: Mutex::new(()),
                channel: Mutex::new(None),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connect to a device: initial summary + state, then either the
    /// WebSocket push channel or periodic polling per `config`.
    pub async fn connect(config: DeviceConfig) -> Result<Self, CoreError> {
        let device = PendingDevice::new(config)?.fetch_summary().await?;
        device.fetch_state().await?;

        let config = &device.inner.config;
        if config.websocket_enabled {
            device.connect_websocket().await?;
        } else if config.poll_interval_secs > 0 {
            device
                .start_polling(Duration::from_secs(config.poll_interval_secs))
                .await;
        }

        info!(host = %config.host, "connected to device");
        Ok(device)
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    pub fn client(&self) -> &DeviceClient {
        &self.inner.client
    }

    pub fn store(&self) -> &DeviceStore {
        &self.inner.store
    }

    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.inner.store.snapshot()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> SnapshotStream {
        self.inner.store.subscribe()
    }

    fn comm_error(&self, err: &swidget_api::Error) -> CoreError {
        CoreError::communication(&self.inner.config.host, err)
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// GET the summary and replace the assembly structure.
    pub async fn fetch_summary(&self) -> Result<(), CoreError> {
        let _guard = self.inner.update_lock.lock().await;
        self.refresh_summary().await
    }

    /// GET the state and overwrite every known function value.
    pub async fn fetch_state(&self) -> Result<(), CoreError> {
        let _guard = self.inner.update_lock.lock().await;
        self.refresh_state().await
    }

    /// Summary then state, as one serialized cycle.
    pub async fn update(&self) -> Result<(), CoreError> {
        let _guard = self.inner.update_lock.lock().await;
        self.refresh_summary().await?;
        self.refresh_state().await
    }

    async fn refresh_summary(&self) -> Result<(), CoreError> {
        let summary = self
            .inner
            .client
            .summary()
            .await
            .map_err(|e| self.comm_error(&e))?;
        self.inner.store.apply_summary(&summary);
        Ok(())
    }

    async fn refresh_state(&self) -> Result<(), CoreError> {
        let state = self
            .inner
            .client
            .state()
            .await
            .map_err(|e| self.comm_error(&e))?;
        self.inner.store.apply_state(&state);
        debug!(host = %self.host(), "state refresh complete");
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Issue a control request for one function.
    ///
    /// With a connected push channel the command goes over the socket and
    /// the resulting value arrives later as a push. Otherwise it is POSTed
    /// and the echoed value is merged before returning.
    pub async fn send_command(
        &self,
        assembly: AssemblyKind,
        component: &str,
        function: &str,
        command: Value,
    ) -> Result<(), CoreError> {
        let path = FunctionPath::new(assembly, component, function);
        if !self.snapshot().has_function(assembly, component, function) {
            return Err(CoreError::UnknownFunction {
                path: path.to_string(),
            });
        }

        if let Some(channel) = self.connected_channel().await {
            match channel.send_command(&path.command_body(command.clone())) {
                Ok(()) => {
                    debug!(%path, "command sent over WebSocket");
                    return Ok(());
                }
                Err(e) => debug!(%path, error = %e, "WebSocket send failed, using REST"),
            }
        }

        let echo = self
            .inner
            .client
            .command(&path, command)
            .await
            .map_err(|e| self.comm_error(&e))?;
        let updated = self.inner.store.apply_echo(&echo);
        if updated == 0 {
            warn!(%path, "command response did not echo the function");
        }
        Ok(())
    }

    pub async fn turn_on(&self) -> Result<(), CoreError> {
        self.send_command(AssemblyKind::Host, PRIMARY_COMPONENT, "toggle", json!({ "state": "on" }))
            .await
    }

    pub async fn turn_off(&self) -> Result<(), CoreError> {
        self.send_command(AssemblyKind::Host, PRIMARY_COMPONENT, "toggle", json!({ "state": "off" }))
            .await
    }

    pub async fn turn_on_usb_insert(&self) -> Result<(), CoreError> {
        self.set_usb(true).await
    }

    pub async fn turn_off_usb_insert(&self) -> Result<(), CoreError> {
        self.set_usb(false).await
    }

    async fn set_usb(&self, on: bool) -> Result<(), CoreError> {
        if self.snapshot().insert.component(USB_COMPONENT).is_none() {
            return Err(CoreError::Unsupported {
                operation: "USB power control".into(),
                required: "a USB insert".into(),
            });
        }
        let state = if on { "on" } else { "off" };
        self.send_command(AssemblyKind::Insert, USB_COMPONENT, "toggle", json!({ "state": state }))
            .await
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<String, CoreError> {
        self.inner.client.ping().await.map_err(|e| self.comm_error(&e))
    }

    /// Flash the identification LED.
    pub async fn blink(&self) -> Result<(), CoreError> {
        self.inner.client.blink().await.map_err(|e| self.comm_error(&e))
    }

    // ── Derived reads (delegate to the current snapshot) ─────────────

    pub fn device_type(&self) -> Option<DeviceType> {
        self.snapshot().device_type()
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.device_type().map(DeviceType::capabilities)
    }

    pub fn is_on(&self) -> Option<bool> {
        self.snapshot().is_on()
    }

    pub fn brightness(&self) -> Option<u8> {
        self.snapshot().brightness()
    }

    pub fn usb_is_on(&self) -> Option<bool> {
        self.snapshot().usb_is_on()
    }

    pub fn plug_power(&self, plug: &str) -> Option<f64> {
        self.snapshot().plug_power(plug)
    }

    pub fn power_by_plug(&self) -> BTreeMap<String, f64> {
        self.snapshot().power_by_plug()
    }

    pub fn total_power(&self) -> Option<f64> {
        self.snapshot().total_power()
    }

    pub fn realtime_values(&self) -> BTreeMap<String, RealtimeValue> {
        self.snapshot().realtime_values()
    }

    pub fn features(&self) -> Vec<String> {
        self.snapshot().features()
    }

    pub fn friendly_name(&self) -> String {
        self.snapshot().friendly_name()
    }

    pub fn hardware_info(&self) -> HardwareInfo {
        self.snapshot().hardware_info()
    }

    pub fn rssi(&self) -> Option<i64> {
        self.snapshot().rssi
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.snapshot().last_update
    }

    // ── Background work ──────────────────────────────────────────────

    /// Run `update()` every `interval` until the device is closed.
    pub async fn start_polling(&self, interval: Duration) {
        if interval.is_zero() || self.inner.cancel.is_cancelled() {
            return;
        }
        let device = self.clone();
        let cancel = self.inner.cancel.clone();
        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(tokio::spawn(poll_task(device, interval, cancel)));
        drop(handles);
        debug!(host = %self.host(), interval_secs = interval.as_secs(), "polling started");
    }

    /// Open the push channel and start applying its messages.
    ///
    /// No-op while a channel is already running. A stopped channel is
    /// replaced by a fresh one.
    pub async fn connect_websocket(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ChannelStopped {
                reason: StopReason::Closed,
            });
        }

        let mut slot = self.inner.channel.lock().await;
        if slot.as_ref().is_some_and(|c| !c.is_stopped()) {
            return Ok(());
        }

        let config = &self.inner.config;
        let url = config.push_url()?;
        let (channel, inbound) =
            WebSocketChannel::new(url, &config.transport(), config.reconnect.clone())?;

        let store_task = tokio::spawn(apply_task(
            self.clone(),
            inbound,
            self.inner.cancel.clone(),
        ));
        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(store_task);
        drop(handles);

        channel.start().await;
        *slot = Some(channel);
        info!(host = %config.host, "WebSocket channel started");
        Ok(())
    }

    /// State of the push channel, if one was opened.
    pub async fn connection_state(&self) -> Option<ChannelState> {
        self.inner.channel.lock().await.as_ref().map(WebSocketChannel::state)
    }

    /// Subscribe to push channel state transitions.
    pub async fn connection_updates(&self) -> Option<watch::Receiver<ChannelState>> {
        self.inner
            .channel
            .lock()
            .await
            .as_ref()
            .map(WebSocketChannel::subscribe)
    }

    /// Why the push channel stopped, if it has.
    pub async fn channel_stop_reason(&self) -> Option<StopReason> {
        self.inner
            .channel
            .lock()
            .await
            .as_ref()
            .and_then(WebSocketChannel::stop_reason)
    }

    async fn connected_channel(&self) -> Option<WebSocketChannel> {
        self.inner
            .channel
            .lock()
            .await
            .as_ref()
            .filter(|c| c.is_connected())
            .cloned()
    }

    /// Stop polling and push, release the socket and join background
    /// tasks. Idempotent; no store update is applied after it returns.
    pub async fn close(&self) {
        self.inner.cancel.cancel();

        let channel = self.inner.channel.lock().await.clone();
        if let Some(channel) = channel {
            channel.close().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!(host = %self.host(), "device closed");
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("Device")
            .field("host", &self.inner.config.host)
            .field("device_type", &snapshot.host.kind)
            .field("model", &snapshot.model)
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodically refresh from the REST API.
async fn poll_task(device: Device, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = device.update().await {
                    warn!(host = %device.host(), error = %e, "periodic update failed");
                }
            }
        }
    }
}

/// Apply pushed messages to the store, in arrival order.
async fn apply_task(
    device: Device,
    mut inbound: mpsc::Receiver<InboundMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = inbound.recv() => {
                let Some(message) = message else { break };
                device.inner.store.apply_inbound(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use secrecy::SecretString;
    use swidget_api::models::SummaryResponse;
    use swidget_api::{ReconnectPolicy, TransportConfig};
    use url::Url;

    fn idle_device(push_url: Url) -> Device {
        let secret = SecretString::from("k".to_string());
        let mut config = DeviceConfig::new("127.0.0.1:9", secret.clone());
        config.websocket_url = Some(push_url);
        config.reconnect = ReconnectPolicy {
            max_failed_attempts: 0,
            handshake_timeout: Duration::from_secs(1),
            ..ReconnectPolicy::default()
        };
        let client = DeviceClient::new(&config.host, &secret, &TransportConfig::default()).unwrap();
        let summary: SummaryResponse = serde_json::from_value(json!({
            "model": "SW-OUT-1",
            "mac": "aabbccddeeff",
            "version": "1.0.0",
            "host": { "type": "outlet", "id": "h1", "components": [{ "id": "0", "functions": ["toggle"] }] },
            "insert": { "type": "blank", "components": [] }
        }))
        .unwrap();
        Device::from_parts(config, client, DeviceSnapshot::from_summary(&summary, None))
    }

    #[tokio::test]
    async fn reconnecting_drops_finished_apply_tasks() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let device = idle_device(Url::parse(&format!("ws://{addr}/api/v1/sock")).unwrap());

        for _ in 0..4 {
            device.connect_websocket().await.unwrap();
            let mut updates = device.connection_updates().await.unwrap();
            tokio::time::timeout(
                Duration::from_secs(5),
                updates.wait_for(|s| *s == ChannelState::Stopped),
            )
            .await
            .unwrap()
            .unwrap();
        }

        // The current channel's task, plus at most the one it replaced.
        assert!(device.inner.task_handles.lock().await.len() <= 2);
        device.close().await;
        assert!(device.inner.task_handles.lock().await.is_empty());
    }
}
