// swidget-core: Device state and control layer between swidget-api and consumers (CLI).

pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod model;
pub mod store;
pub mod stream;
pub mod variants;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DeviceConfig, DiscoveryConfig, TlsVerification};
pub use device::{Device, PendingDevice};
pub use discovery::{DiscoveredDevice, discover_devices, discover_single};
pub use error::CoreError;
pub use store::{DeviceSnapshot, DeviceStore};
pub use stream::SnapshotStream;
pub use variants::{Dimmer, Outlet, Switch, TimerSwitch, TypedDevice};

pub use model::{Assembly, Capabilities, Component, DeviceType, HardwareInfo, RealtimeValue};

// Transport types consumers need without depending on swidget-api directly.
pub use swidget_api::models::AssemblyKind;
pub use swidget_api::{ChannelState, ReconnectPolicy, StopReason};
