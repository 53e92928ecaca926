// ── Device domain model ──
//
// Canonical representation of a device's hardware: two assemblies of
// components, each component a bag of function values. Built from the
// REST/WebSocket wire types in `swidget_api::models`.

pub mod assembly;
pub mod device_type;
pub mod readings;

pub use assembly::{Assembly, Component};
pub use device_type::{Capabilities, DeviceType};
pub use readings::{HardwareInfo, RealtimeValue};
