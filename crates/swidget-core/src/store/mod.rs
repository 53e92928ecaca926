// ── Device state store ──
//
// Single-writer / multi-reader store for one device. The current
// snapshot lives in a `watch` channel: every mutation clones it,
// applies the change and swaps the `Arc` while holding the channel's
// write lock, so concurrent REST and push updates never interleave and
// readers never observe a half-applied update.

mod snapshot;

use std::sync::Arc;

use serde_json::Value;
use swidget_api::models::{StateResponse, SummaryResponse};
use swidget_api::{InboundMessage, MessageKind};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::stream::SnapshotStream;

pub use snapshot::{DeviceSnapshot, PRIMARY_COMPONENT, USB_COMPONENT};

/// Reactive store holding the latest [`DeviceSnapshot`].
pub struct DeviceStore {
    snapshot: watch::Sender<Arc<DeviceSnapshot>>,
}

impl DeviceStore {
    pub fn new(initial: DeviceSnapshot) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(initial));
        Self { snapshot }
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.snapshot.subscribe())
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Copy-on-write update. `apply` returns whether anything changed;
    /// subscribers are only notified when it did.
    fn mutate(&self, apply: impl FnOnce(&mut DeviceSnapshot) -> bool) -> bool {
        self.snapshot.send_if_modified(|current| {
            let mut next = DeviceSnapshot::clone(current);
            if apply(&mut next) {
                *current = Arc::new(next);
                true
            } else {
                false
            }
        })
    }

    /// Replace the structure from a summary, keeping surviving values.
    pub fn apply_summary(&self, summary: &SummaryResponse) {
        self.mutate(|snapshot| {
            *snapshot = DeviceSnapshot::from_summary(summary, Some(snapshot));
            true
        });
    }

    /// Overwrite known function values from a full state snapshot.
    pub fn apply_state(&self, state: &StateResponse) {
        self.mutate(|snapshot| {
            snapshot.apply_state(state);
            true
        });
    }

    /// Merge a command echo. Returns the number of functions updated.
    pub fn apply_echo(&self, body: &Value) -> usize {
        let mut updated = 0;
        self.mutate(|snapshot| {
            updated = snapshot.apply_echo(body);
            updated > 0
        });
        updated
    }

    /// Apply one message pushed over the WebSocket.
    pub fn apply_inbound(&self, message: InboundMessage) {
        let kind = message.kind();
        match kind {
            MessageKind::Summary => match serde_json::from_value(message.into_body()) {
                Ok(summary) => self.apply_summary(&summary),
                Err(e) => debug!(error = %e, "Ignoring malformed summary push"),
            },
            MessageKind::State => match serde_json::from_value(message.into_body()) {
                Ok(state) => self.apply_state(&state),
                Err(e) => debug!(error = %e, "Ignoring malformed state push"),
            },
            MessageKind::Command => {
                let body = message.into_body();
                // Echoes may wrap the body in a JSON-string `payload`.
                let echo = match body.get("payload").and_then(Value::as_str) {
                    Some(payload) => serde_json::from_str(payload).unwrap_or(Value::Null),
                    None => body,
                };
                let updated = self.apply_echo(&echo);
                trace!(updated, "Applied command echo");
            }
            MessageKind::Other => {
                trace!(request_id = %message.request_id, "Ignoring push message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use swidget_api::websocket::parse_message;

    use crate::model::RealtimeValue;

    fn summary() -> SummaryResponse {
        serde_json::from_value(json!({
            "model": "SW-DIM-1",
            "mac": "aabbccddeeff",
            "version": "1.4.2",
            "host": {
                "type": "dimmer",
                "id": "h1",
                "components": [{ "id": "0", "functions": ["toggle", "level", "power"] }]
            },
            "insert": {
                "type": "thp",
                "components": [
                    { "id": "sensor", "functions": ["temperature", "humidity"] },
                    { "id": "motion", "functions": ["occupied"] },
                    { "id": "usb", "functions": ["toggle"] }
                ]
            }
        }))
        .unwrap()
    }

    fn state() -> StateResponse {
        serde_json::from_value(json!({
            "connection": { "rssi": -52 },
            "host": { "components": { "0": {
                "toggle": { "state": "on" },
                "level": { "now": 65 },
                "power": { "current": 8.25 }
            }}},
            "insert": { "components": {
                "sensor": { "temperature": { "now": 21.5 }, "humidity": { "now": 40 } },
                "motion": { "occupied": { "state": false } },
                "usb": { "toggle": { "state": "off" } }
            }}
        }))
        .unwrap()
    }

    fn populated() -> DeviceStore {
        let store = DeviceStore::new(DeviceSnapshot::from_summary(&summary(), None));
        store.apply_state(&state());
        store
    }

    #[test]
    fn accessors_are_none_before_state() {
        let store = DeviceStore::new(DeviceSnapshot::from_summary(&summary(), None));
        let snap = store.snapshot();
        assert_eq!(snap.is_on(), None);
        assert_eq!(snap.brightness(), None);
        assert_eq!(snap.usb_is_on(), None);
        assert_eq!(snap.total_power(), None);
        assert!(snap.realtime_values().is_empty());
        assert_eq!(snap.rssi, None);
    }

    #[test]
    fn derived_accessors() {
        let snap = populated().snapshot();
        assert_eq!(snap.is_on(), Some(true));
        assert_eq!(snap.brightness(), Some(65));
        assert_eq!(snap.usb_is_on(), Some(false));
        assert_eq!(snap.plug_power("0"), Some(8.25));
        assert_eq!(snap.total_power(), Some(8.25));
        assert_eq!(snap.rssi, Some(-52));
        assert_eq!(snap.features(), vec!["motion", "sensor", "usb"]);
        assert_eq!(snap.friendly_name(), "Swidget dimmer w/thp insert");
    }

    #[test]
    fn realtime_values_flatten_insert_and_power() {
        let values = populated().snapshot().realtime_values();
        assert_eq!(values.len(), 4);
        assert_eq!(values["temperature"], RealtimeValue::Number(21.5));
        assert_eq!(values["humidity"], RealtimeValue::Number(40.0));
        assert_eq!(values["occupied"], RealtimeValue::State("off".into()));
        assert_eq!(values["power_0"], RealtimeValue::Number(8.25));
        assert!(!values.contains_key("toggle"));
    }

    #[test]
    fn echo_updates_only_known_functions() {
        let store = populated();
        let before = store.snapshot();

        let updated = store.apply_echo(&json!({
            "host": { "components": { "0": { "level": { "now": 10 } } } }
        }));
        assert_eq!(updated, 1);
        assert_eq!(store.snapshot().brightness(), Some(10));
        // The old snapshot is untouched.
        assert_eq!(before.brightness(), Some(65));

        assert_eq!(store.apply_echo(&json!({ "host": { "components": { "7": {} } } })), 0);
    }

    #[test]
    fn brightness_accepts_float_levels() {
        let store = populated();
        store.apply_echo(&json!({
            "host": { "components": { "0": { "level": { "now": 65.0 } } } }
        }));
        assert_eq!(store.snapshot().brightness(), Some(65));

        store.apply_echo(&json!({
            "host": { "components": { "0": { "level": { "now": 42.6 } } } }
        }));
        assert_eq!(store.snapshot().brightness(), Some(43));

        store.apply_echo(&json!({
            "host": { "components": { "0": { "level": { "now": -3.0 } } } }
        }));
        assert_eq!(store.snapshot().brightness(), None);
    }

    #[test]
    fn summary_refresh_keeps_values() {
        let store = populated();
        store.apply_summary(&summary());
        let snap = store.snapshot();
        assert_eq!(snap.is_on(), Some(true));
        assert_eq!(snap.rssi, Some(-52));
    }

    #[test]
    fn inbound_messages_route_by_kind() {
        let store = populated();

        let push = parse_message(
            &json!({
                "request_id": "state",
                "host": { "components": { "0": { "toggle": { "state": "off" } } } }
            })
            .to_string(),
        )
        .unwrap();
        store.apply_inbound(push);
        assert_eq!(store.snapshot().is_on(), Some(false));

        let echo = parse_message(
            &json!({
                "request_id": "command",
                "insert": { "components": { "usb": { "toggle": { "state": "on" } } } }
            })
            .to_string(),
        )
        .unwrap();
        store.apply_inbound(echo);
        assert_eq!(store.snapshot().usb_is_on(), Some(true));

        let other = parse_message(r#"{"request_id":"hello","host":{}}"#).unwrap();
        let before = store.snapshot();
        store.apply_inbound(other);
        assert_eq!(*store.snapshot(), *before);
    }

    #[tokio::test]
    async fn subscribers_see_each_change() {
        let store = populated();
        let mut stream = store.subscribe();

        store.apply_echo(&json!({
            "host": { "components": { "0": { "toggle": { "state": "off" } } } }
        }));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.is_on(), Some(false));
    }
}
