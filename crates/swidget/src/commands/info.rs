//! `swidget info` and `swidget readings`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use swidget_core::{RealtimeValue, TypedDevice};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Info ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DeviceInfo {
    name: String,
    host: String,
    device_type: String,
    insert_type: String,
    model: String,
    mac: String,
    version: String,
    is_on: Option<bool>,
    brightness: Option<u8>,
    usb_is_on: Option<bool>,
    total_power: Option<f64>,
    rssi: Option<i64>,
    features: Vec<String>,
    last_update: Option<DateTime<Utc>>,
}

impl DeviceInfo {
    fn from_device(device: &TypedDevice) -> Self {
        let hw = device.hardware_info();
        Self {
            name: device.friendly_name(),
            host: device.host().to_owned(),
            device_type: device.device_type().to_string(),
            insert_type: hw.insert_type,
            model: hw.model,
            mac: hw.mac_address,
            version: hw.version,
            is_on: device.is_on(),
            brightness: device.brightness(),
            usb_is_on: device.usb_is_on(),
            total_power: device.total_power(),
            rssi: device.rssi(),
            features: hw.features,
            last_update: device.last_update(),
        }
    }
}

fn detail(info: &DeviceInfo, color: bool) -> String {
    let opt = |v: Option<String>| v.unwrap_or_else(|| "-".into());
    let mut lines = vec![
        format!("Name:        {}", info.name),
        format!("Host:        {}", info.host),
        format!("Type:        {}", info.device_type),
        format!("Insert:      {}", info.insert_type),
        format!("Model:       {}", info.model),
        format!("MAC:         {}", info.mac),
        format!("Firmware:    {}", info.version),
        format!("Power:       {}", output::power_label(info.is_on, color)),
    ];
    if info.brightness.is_some() {
        lines.push(format!("Brightness:  {}%", opt(info.brightness.map(|b| b.to_string()))));
    }
    if info.usb_is_on.is_some() {
        lines.push(format!("USB:         {}", output::power_label(info.usb_is_on, color)));
    }
    lines.push(format!(
        "Load:        {}",
        opt(info.total_power.map(|w| format!("{w:.1} W")))
    ));
    lines.push(format!(
        "RSSI:        {}",
        opt(info.rssi.map(|r| format!("{r} dBm")))
    ));
    if !info.features.is_empty() {
        lines.push(format!("Features:    {}", info.features.join(", ")));
    }
    lines.push(format!(
        "Updated:     {}",
        opt(info.last_update.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()))
    ));
    lines.join("\n")
}

pub fn info(device: &TypedDevice, global: &GlobalOpts) -> Result<(), CliError> {
    let info = DeviceInfo::from_device(device);
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &info,
        |i| detail(i, color),
        |i| i.mac.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Readings ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Reading {
    name: String,
    value: RealtimeValue,
}

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Reading")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn collect_readings(values: BTreeMap<String, RealtimeValue>) -> Vec<Reading> {
    values
        .into_iter()
        .map(|(name, value)| Reading { name, value })
        .collect()
}

pub fn readings(device: &TypedDevice, global: &GlobalOpts) -> Result<(), CliError> {
    let readings = collect_readings(device.realtime_values());
    let out = output::render_list(
        &global.output,
        &readings,
        |r| ReadingRow {
            name: r.name.clone(),
            value: r.value.to_string(),
        },
        |r| format!("{}={}", r.name, r.value),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_keep_map_order() {
        let mut values = BTreeMap::new();
        values.insert("power_0".to_owned(), RealtimeValue::Number(4.5));
        values.insert("occupied".to_owned(), RealtimeValue::State("on".into()));
        let readings = collect_readings(values);
        let names: Vec<_> = readings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["occupied", "power_0"]);
    }
}
