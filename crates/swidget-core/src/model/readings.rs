// ── Derived readings ──

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// One entry of the realtime readings map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RealtimeValue {
    Number(f64),
    State(String),
}

impl RealtimeValue {
    /// Reading reported by an insert function.
    ///
    /// `occupied` reports its `state` (booleans become `"on"`/`"off"`);
    /// everything else reports `now`.
    pub fn from_function(function: &str, value: &Value) -> Option<Self> {
        if function == "occupied" {
            return match value.get("state")? {
                Value::Bool(true) => Some(Self::State("on".into())),
                Value::Bool(false) => Some(Self::State("off".into())),
                Value::String(s) => Some(Self::State(s.clone())),
                _ => None,
            };
        }
        match value.get("now")? {
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::State(s.clone())),
            Value::Bool(b) => Some(Self::State(if *b { "on" } else { "off" }.into())),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::State(_) => None,
        }
    }
}

impl fmt::Display for RealtimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::State(s) => f.write_str(s),
        }
    }
}

/// Hardware-related attributes of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareInfo {
    pub version: String,
    pub mac_address: String,
    pub device_type: String,
    pub id: Option<String>,
    pub model: String,
    pub insert_type: String,
    pub features: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn occupied_reports_state() {
        assert_eq!(
            RealtimeValue::from_function("occupied", &json!({ "state": true })),
            Some(RealtimeValue::State("on".into()))
        );
        assert_eq!(
            RealtimeValue::from_function("occupied", &json!({ "state": "off" })),
            Some(RealtimeValue::State("off".into()))
        );
    }

    #[test]
    fn sensors_report_now() {
        assert_eq!(
            RealtimeValue::from_function("temperature", &json!({ "now": 21.5 })),
            Some(RealtimeValue::Number(21.5))
        );
        assert_eq!(RealtimeValue::from_function("humidity", &json!({})), None);
    }

    #[test]
    fn display() {
        assert_eq!(RealtimeValue::Number(3.0).to_string(), "3");
        assert_eq!(RealtimeValue::State("on".into()).to_string(), "on");
    }
}
