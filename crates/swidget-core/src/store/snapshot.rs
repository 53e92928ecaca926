// ── Immutable device snapshot ──
//
// Every accessor here is a pure function over one snapshot: no I/O,
// `None` when the underlying value has not been populated yet.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use swidget_api::models::{AssemblyKind, StateResponse, SummaryResponse};

use crate::model::{Assembly, DeviceType, HardwareInfo, RealtimeValue};

/// Component every host exposes its main relay/dimmer on.
pub const PRIMARY_COMPONENT: &str = "0";

/// Insert component carrying the USB power toggle.
pub const USB_COMPONENT: &str = "usb";

/// Point-in-time view of a device.
///
/// Always fully populated: both assemblies come from the same summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub model: String,
    pub mac: String,
    pub version: String,
    pub host: Assembly,
    pub insert: Assembly,
    pub rssi: Option<i64>,
    pub last_update: Option<DateTime<Utc>>,
}

impl DeviceSnapshot {
    /// Build from a summary, carrying over values from `previous` for
    /// functions that still exist.
    pub fn from_summary(summary: &SummaryResponse, previous: Option<&Self>) -> Self {
        Self {
            model: summary.model.clone(),
            mac: summary.mac.clone(),
            version: summary.version.clone(),
            host: Assembly::from_summary(&summary.host, previous.map(|p| &p.host)),
            insert: Assembly::from_summary(&summary.insert, previous.map(|p| &p.insert)),
            rssi: previous.and_then(|p| p.rssi),
            last_update: Some(Utc::now()),
        }
    }

    /// Overwrite values of known functions in both assemblies.
    pub fn apply_state(&mut self, state: &StateResponse) {
        self.host.apply_state(&state.host);
        self.insert.apply_state(&state.insert);
        if let Some(rssi) = state.connection.as_ref().and_then(|c| c.rssi) {
            self.rssi = Some(rssi);
        }
        self.last_update = Some(Utc::now());
    }

    /// Merge a command echo (`{<assembly>: {components: ...}}`). Returns
    /// the number of functions updated.
    pub fn apply_echo(&mut self, body: &Value) -> usize {
        AssemblyKind::ALL
            .into_iter()
            .filter_map(|kind| body.get(kind.as_str()).map(|fragment| (kind, fragment)))
            .map(|(kind, fragment)| self.assembly_mut(kind).apply_fragment(fragment))
            .sum()
    }

    // ── Structure ────────────────────────────────────────────────────

    pub fn assembly(&self, kind: AssemblyKind) -> &Assembly {
        match kind {
            AssemblyKind::Host => &self.host,
            AssemblyKind::Insert => &self.insert,
        }
    }

    fn assembly_mut(&mut self, kind: AssemblyKind) -> &mut Assembly {
        match kind {
            AssemblyKind::Host => &mut self.host,
            AssemblyKind::Insert => &mut self.insert,
        }
    }

    /// Raw host type tag.
    pub fn device_type_tag(&self) -> &str {
        &self.host.kind
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        DeviceType::from_tag(&self.host.kind)
    }

    pub fn insert_type(&self) -> &str {
        &self.insert.kind
    }

    pub fn has_function(&self, kind: AssemblyKind, component: &str, function: &str) -> bool {
        self.assembly(kind)
            .component(component)
            .is_some_and(|c| c.has_function(function))
    }

    pub fn value(&self, kind: AssemblyKind, component: &str, function: &str) -> Option<&Value> {
        self.assembly(kind).value(component, function)
    }

    // ── Derived accessors ────────────────────────────────────────────

    /// `host/0/toggle.state == "on"`.
    pub fn is_on(&self) -> Option<bool> {
        toggle_state(self.host.value(PRIMARY_COMPONENT, "toggle")?)
    }

    /// `host/0/level.now`, 0-100. Fractional levels are rounded.
    pub fn brightness(&self) -> Option<u8> {
        let now = self.host.value(PRIMARY_COMPONENT, "level")?.get("now")?;
        let level = match now.as_u64() {
            Some(n) => n.min(100),
            None => percent_from_float(now.as_f64()?)?,
        };
        u8::try_from(level).ok()
    }

    /// `insert/usb/toggle.state == "on"`.
    pub fn usb_is_on(&self) -> Option<bool> {
        toggle_state(self.insert.value(USB_COMPONENT, "toggle")?)
    }

    /// Power draw of one host plug in watts.
    pub fn plug_power(&self, plug: &str) -> Option<f64> {
        self.host.value(plug, "power")?.get("current")?.as_f64()
    }

    /// Power draw of every plug with a populated reading.
    pub fn power_by_plug(&self) -> BTreeMap<String, f64> {
        self.host
            .components
            .keys()
            .filter_map(|id| self.plug_power(id).map(|watts| (id.clone(), watts)))
            .collect()
    }

    /// Sum of all plug readings. `None` before any reading arrived.
    pub fn total_power(&self) -> Option<f64> {
        let readings = self.power_by_plug();
        if readings.is_empty() {
            None
        } else {
            Some(readings.values().sum())
        }
    }

    /// Flat name → value map of insert readings and host power.
    ///
    /// Insert functions other than `toggle` contribute one entry each;
    /// every host plug contributes `power_{id}`.
    pub fn realtime_values(&self) -> BTreeMap<String, RealtimeValue> {
        let mut values = BTreeMap::new();

        for component in self.insert.components.values() {
            for (function, value) in &component.functions {
                if function == "toggle" || value.is_null() {
                    continue;
                }
                if let Some(reading) = RealtimeValue::from_function(function, value) {
                    values.insert(function.clone(), reading);
                }
            }
        }

        for (id, watts) in self.power_by_plug() {
            values.insert(format!("power_{id}"), RealtimeValue::Number(watts));
        }

        values
    }

    /// Insert component ids (`usb`, `sensor`, ...).
    pub fn features(&self) -> Vec<String> {
        self.insert.components.keys().cloned().collect()
    }

    pub fn friendly_name(&self) -> String {
        format!("Swidget {} w/{} insert", self.host.kind, self.insert.kind)
    }

    pub fn hardware_info(&self) -> HardwareInfo {
        HardwareInfo {
            version: self.version.clone(),
            mac_address: self.mac.clone(),
            device_type: self.host.kind.clone(),
            id: self.host.id.clone(),
            model: self.model.clone(),
            insert_type: self.insert.kind.clone(),
            features: self.features(),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent_from_float(level: f64) -> Option<u64> {
    if !level.is_finite() || level < 0.0 {
        return None;
    }
    // Clamped to 0..=100 first, so the cast is exact.
    Some(level.round().min(100.0) as u64)
}

fn toggle_state(value: &Value) -> Option<bool> {
    match value.get("state")? {
        Value::String(s) => Some(s == "on"),
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}
