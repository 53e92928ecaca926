#![allow(clippy::unwrap_used)]
// Integration tests for the device facade using wiremock.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use swidget_api::{DeviceClient, TransportConfig};
use swidget_core::discovery::resolve;
use swidget_core::{
    AssemblyKind, ChannelState, CoreError, DeviceConfig, DeviceType, PendingDevice,
    ReconnectPolicy, StopReason, TypedDevice,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn config(host: &str) -> DeviceConfig {
    let mut config = DeviceConfig::new(host, SecretString::from("secret".to_string()));
    config.reconnect = ReconnectPolicy {
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        max_failed_attempts: 2,
        reconnect_delay: Duration::from_millis(5),
        handshake_timeout: Duration::from_secs(1),
    };
    config
}

fn pending(server: &MockServer) -> PendingDevice {
    let http = TransportConfig::default()
        .build_client(&SecretString::from("secret".to_string()))
        .unwrap();
    let client = DeviceClient::with_client(http, Url::parse(&server.uri()).unwrap());
    PendingDevice::with_client(config("127.0.0.1:9"), client)
}

fn summary(device_type: &str) -> Value {
    json!({
        "model": "SW-TEST",
        "mac": "aabbccddeeff",
        "version": "1.4.2",
        "host": {
            "type": device_type,
            "id": "h1",
            "components": [{ "id": "0", "functions": ["toggle", "level", "power"] }]
        },
        "insert": {
            "type": "thp",
            "components": [
                { "id": "sensor", "functions": ["temperature", "humidity"] },
                { "id": "motion", "functions": ["occupied"] }
            ]
        }
    })
}

fn state(toggle: &str, level: u64) -> Value {
    json!({
        "connection": { "rssi": -55 },
        "host": { "components": { "0": {
            "toggle": { "state": toggle },
            "level": { "now": level },
            "power": { "current": 3.5 }
        }}},
        "insert": { "components": {
            "sensor": { "temperature": { "now": 21.5 }, "humidity": { "now": 40 } },
            "motion": { "occupied": { "state": "on" } }
        }}
    })
}

async fn mount_device(server: &MockServer, device_type: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v1/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary(device_type)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(state("on", 65)))
        .mount(server)
        .await;
}

fn command_echo(function: &str, value: Value) -> Value {
    json!({ "host": { "components": { "0": { function: value } } } })
}

// ── Snapshot + reads ────────────────────────────────────────────────

#[tokio::test]
async fn test_update_populates_readings() {
    let server = MockServer::start().await;
    mount_device(&server, "outlet").await;

    let device = pending(&server).fetch_summary().await.unwrap();
    assert_eq!(device.is_on(), None);

    device.update().await.unwrap();

    assert_eq!(device.is_on(), Some(true));
    assert_eq!(device.rssi(), Some(-55));
    assert_eq!(device.total_power(), Some(3.5));
    assert!(device.last_update().is_some());
    insta::assert_debug_snapshot!(device.realtime_values(), @r#"
    {
        "humidity": Number(
            40.0,
        ),
        "occupied": State(
            "on",
        ),
        "power_0": Number(
            3.5,
        ),
        "temperature": Number(
            21.5,
        ),
    }
    "#);
}

#[tokio::test]
async fn test_hardware_info() {
    let server = MockServer::start().await;
    mount_device(&server, "dimmer").await;

    let device = pending(&server).fetch_summary().await.unwrap();
    let info = device.hardware_info();

    assert_eq!(info.model, "SW-TEST");
    assert_eq!(info.mac_address, "aabbccddeeff");
    assert_eq!(info.device_type, "dimmer");
    assert_eq!(info.insert_type, "thp");
    assert_eq!(info.features, vec!["motion", "sensor"]);
    assert_eq!(device.friendly_name(), "Swidget dimmer w/thp insert");
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rest_command_stores_echo() {
    let server = MockServer::start().await;
    mount_device(&server, "switch").await;

    let echo = command_echo("toggle", json!({ "state": "off" }));
    Mock::given(method("POST"))
        .and(path("/api/v1/command"))
        .and(body_json(echo.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(&echo))
        .expect(1)
        .mount(&server)
        .await;

    let device = pending(&server).fetch_summary().await.unwrap();
    device.update().await.unwrap();
    device.turn_off().await.unwrap();

    assert_eq!(device.is_on(), Some(false));
}

#[tokio::test]
async fn test_unknown_function_is_rejected_locally() {
    let server = MockServer::start().await;
    mount_device(&server, "outlet").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/command"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let device = pending(&server).fetch_summary().await.unwrap();
    let err = device
        .send_command(AssemblyKind::Host, "7", "toggle", json!({ "state": "on" }))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownFunction { ref path } if path == "host/7/toggle"));

    let err = device.turn_on_usb_insert().await.unwrap_err();
    assert!(matches!(err, CoreError::Unsupported { .. }));
}

#[tokio::test]
async fn test_rest_failure_is_transient_communication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary("outlet")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(500).set_body_string("busy"))
        .mount(&server)
        .await;

    let device = pending(&server).fetch_summary().await.unwrap();
    let err = device.update().await.unwrap_err();

    assert!(matches!(err, CoreError::Communication { .. }));
    assert!(err.is_transient());
}

// ── Resolve ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_resolve_dimmer() {
    let server = MockServer::start().await;
    mount_device(&server, "dimmer").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/command"))
        .and(body_json(command_echo("level", json!({ "now": 40 }))))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(command_echo("level", json!({ "now": 40 }))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let typed = resolve(pending(&server)).await.unwrap();
    assert_eq!(typed.device_type(), DeviceType::Dimmer);
    assert_eq!(typed.is_on(), Some(true));

    let TypedDevice::Dimmer(dimmer) = &typed else {
        panic!("expected a dimmer, got {typed:?}");
    };
    assert_eq!(dimmer.brightness(), Some(65));
    assert!(matches!(
        dimmer.set_brightness(101).await,
        Err(CoreError::ValidationFailed { .. })
    ));
    dimmer.set_brightness(40).await.unwrap();
    assert_eq!(dimmer.brightness(), Some(40));
}

#[tokio::test]
async fn test_resolve_pana_switch_as_timer_switch() {
    let server = MockServer::start().await;
    mount_device(&server, "pana_switch").await;

    let typed = resolve(pending(&server)).await.unwrap();
    assert!(typed.as_timer_switch().is_some());
    assert!(typed.as_dimmer().is_none());
}

#[tokio::test]
async fn test_resolve_unknown_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary("bogus")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(state("on", 1)))
        .expect(0)
        .mount(&server)
        .await;

    let err = resolve(pending(&server)).await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownDeviceType { ref device_type } if device_type == "bogus"));
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rest_and_push_updates_never_mix() {
    let server = MockServer::start().await;
    mount_device(&server, "dimmer").await;

    let device = pending(&server).fetch_summary().await.unwrap();
    device.update().await.unwrap();

    let push: swidget_api::models::StateResponse =
        serde_json::from_value(state("off", 90)).unwrap();

    let writer = {
        let device = device.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                device.update().await.unwrap();
            }
        })
    };
    let pusher = {
        let device = device.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                device.store().apply_state(&push);
                tokio::task::yield_now().await;
            }
        })
    };

    while !writer.is_finished() || !pusher.is_finished() {
        let snap = device.snapshot();
        let pair = (snap.is_on(), snap.brightness());
        assert!(
            pair == (Some(true), Some(65)) || pair == (Some(false), Some(90)),
            "mixed snapshot: {pair:?}"
        );
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    pusher.await.unwrap();
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_close_stops_polling_and_is_idempotent() {
    let server = MockServer::start().await;
    mount_device(&server, "outlet").await;

    let device = pending(&server).fetch_summary().await.unwrap();
    device.start_polling(Duration::from_millis(20)).await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    device.close().await;
    let after_close = server.received_requests().await.unwrap().len();
    assert!(after_close > 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    device.close().await;
    assert_eq!(server.received_requests().await.unwrap().len(), after_close);
}

#[tokio::test]
async fn test_unreachable_websocket_falls_back_to_rest() {
    let server = MockServer::start().await;
    mount_device(&server, "switch").await;
    let echo = command_echo("toggle", json!({ "state": "off" }));
    Mock::given(method("POST"))
        .and(path("/api/v1/command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&echo))
        .expect(1)
        .mount(&server)
        .await;

    // config.host points at a port nobody listens on.
    let device = pending(&server).fetch_summary().await.unwrap();
    device.connect_websocket().await.unwrap();

    let mut updates = device.connection_updates().await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        updates.wait_for(|s| *s == ChannelState::Stopped),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(device.channel_stop_reason().await, Some(StopReason::TooManyRetries));

    device.turn_off().await.unwrap();
    assert_eq!(device.is_on(), Some(false));

    device.close().await;
    assert_eq!(device.connection_state().await, Some(ChannelState::Stopped));
}

#[tokio::test]
async fn test_connected_websocket_carries_commands_and_pushes() {
    let server = MockServer::start().await;
    mount_device(&server, "switch").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/command"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel::<()>();

    let socket = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // Bootstrap summary + state requests, then the command.
        let mut frames = Vec::new();
        while frames.len() < 3 {
            if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
                frames.push(serde_json::from_str::<Value>(text.as_str()).unwrap());
            }
        }

        let push = |toggle: &str| {
            Message::text(
                json!({
                    "request_id": "state",
                    "host": { "components": { "0": { "toggle": { "state": toggle } } } }
                })
                .to_string(),
            )
        };
        ws.send(push("off")).await.unwrap();

        // Once the client has closed, a late push must not land.
        closed_rx.await.unwrap();
        let _ = ws.send(push("on")).await;
        frames.pop().unwrap()
    });

    let http = TransportConfig::default()
        .build_client(&SecretString::from("secret".to_string()))
        .unwrap();
    let client = DeviceClient::with_client(http, Url::parse(&server.uri()).unwrap());
    let mut cfg = config("127.0.0.1:9");
    cfg.websocket_url = Some(Url::parse(&format!("ws://{addr}/api/v1/sock")).unwrap());
    let device = PendingDevice::with_client(cfg, client)
        .fetch_summary()
        .await
        .unwrap();
    device.update().await.unwrap();
    assert_eq!(device.is_on(), Some(true));

    let mut snapshots = device.subscribe();
    device.connect_websocket().await.unwrap();
    let mut updates = device.connection_updates().await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        updates.wait_for(|s| *s == ChannelState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    device.turn_off().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while snapshots.changed().await.unwrap().is_on() != Some(false) {}
    })
    .await
    .unwrap();
    assert_eq!(device.is_on(), Some(false));

    device.close().await;
    closed_tx.send(()).unwrap();
    let command = tokio::time::timeout(Duration::from_secs(5), socket)
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(command["type"], "command");
    assert_eq!(command["request_id"], "command");
    let payload: Value = serde_json::from_str(command["payload"].as_str().unwrap()).unwrap();
    assert_eq!(payload, command_echo("toggle", json!({ "state": "off" })));

    assert_eq!(device.is_on(), Some(false));
    assert_eq!(device.channel_stop_reason().await, Some(StopReason::Closed));
}

#[tokio::test]
async fn test_ping_and_blink() {
    let server = MockServer::start().await;
    mount_device(&server, "outlet").await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blink"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let device = pending(&server).fetch_summary().await.unwrap();
    assert_eq!(device.ping().await.unwrap(), "pong");
    device.blink().await.unwrap();
}
