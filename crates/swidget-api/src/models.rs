// Wire types for the device REST and WebSocket payloads.
//
// Shapes follow what the firmware sends; unknown fields are ignored and
// function values are kept as raw JSON because each function carries its
// own small blob (`{"state":"on"}`, `{"now":42}`, `{"current":3.2}`).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The two physical modules every device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyKind {
    /// The wall unit: relays, dimmer, power metering.
    Host,
    /// The pluggable insert module: sensors, USB, night light.
    Insert,
}

impl AssemblyKind {
    pub const ALL: [Self; 2] = [Self::Host, Self::Insert];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Insert => "insert",
        }
    }
}

impl fmt::Display for AssemblyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Summary ─────────────────────────────────────────────────────────

/// `GET /api/v1/summary`: identity plus component/function topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub model: String,
    pub mac: String,
    pub version: String,
    pub host: AssemblySummary,
    pub insert: AssemblySummary,
}

impl SummaryResponse {
    pub fn assembly(&self, kind: AssemblyKind) -> &AssemblySummary {
        match kind {
            AssemblyKind::Host => &self.host,
            AssemblyKind::Insert => &self.insert,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblySummary {
    /// Type tag: `"outlet"`, `"dimmer"`, `"pana_switch"`, or an insert type.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentSummary>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub id: String,
    #[serde(default)]
    pub functions: Vec<String>,
}

// ── State ───────────────────────────────────────────────────────────

/// `GET /api/v1/state`: current function values per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateResponse {
    #[serde(default)]
    pub connection: Option<ConnectionInfo>,
    #[serde(default)]
    pub host: AssemblyState,
    #[serde(default)]
    pub insert: AssemblyState,
}

impl StateResponse {
    pub fn assembly(&self, kind: AssemblyKind) -> &AssemblyState {
        match kind {
            AssemblyKind::Host => &self.host,
            AssemblyKind::Insert => &self.insert,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub rssi: Option<i64>,
}

/// Component id → function name → value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyState {
    #[serde(default)]
    pub components: HashMap<String, HashMap<String, Value>>,
}

// ── Commands ────────────────────────────────────────────────────────

/// Address of a single function on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPath {
    pub assembly: AssemblyKind,
    pub component: String,
    pub function: String,
}

impl FunctionPath {
    pub fn new(assembly: AssemblyKind, component: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            assembly,
            component: component.into(),
            function: function.into(),
        }
    }

    /// Build the `POST /command` body:
    /// `{<assembly>: {components: {<component>: {<function>: <command>}}}}`.
    pub fn command_body(&self, command: Value) -> Value {
        json!({
            self.assembly.as_str(): {
                "components": {
                    self.component.as_str(): {
                        self.function.as_str(): command
                    }
                }
            }
        })
    }

    /// Pull the value at this path out of a command response or push message.
    pub fn extract<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        body.get(self.assembly.as_str())?
            .get("components")?
            .get(&self.component)?
            .get(&self.function)
    }
}

impl fmt::Display for FunctionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.assembly, self.component, self.function)
    }
}

/// Envelope for requests sent over the WebSocket.
///
/// Commands carry the REST command body serialized as a JSON *string*
/// in `payload`; bootstrap requests carry no payload.
#[derive(Debug, Clone, Serialize)]
pub struct SocketRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl SocketRequest {
    pub fn summary() -> Self {
        Self {
            kind: "summary".into(),
            request_id: "1".into(),
            payload: None,
        }
    }

    pub fn state() -> Self {
        Self {
            kind: "state".into(),
            request_id: "2".into(),
            payload: None,
        }
    }

    pub fn command(body: &Value) -> Self {
        Self {
            kind: "command".into(),
            request_id: "command".into(),
            payload: Some(body.to_string()),
        }
    }

    pub fn to_text(&self) -> String {
        // Plain strings and an optional string: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
