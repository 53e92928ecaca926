// ── Assemblies and components ──

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use swidget_api::models::{AssemblySummary, AssemblyState};

/// One addressable sub-unit of an assembly (a relay, a sensor cluster).
///
/// Function keys come from the summary; values stay `Null` until the
/// first state fetch or command echo fills them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Component {
    pub functions: BTreeMap<String, Value>,
}

impl Component {
    /// Populated value of `function`. `None` when unknown or still unset.
    pub fn value(&self, function: &str) -> Option<&Value> {
        self.functions.get(function).filter(|v| !v.is_null())
    }

    pub fn has_function(&self, function: &str) -> bool {
        self.functions.contains_key(function)
    }
}

/// One physical module of the device (`host` or `insert`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assembly {
    /// Type tag: `outlet`, `dimmer`, an insert type, ...
    pub kind: String,
    pub id: Option<String>,
    pub error: Option<String>,
    pub components: BTreeMap<String, Component>,
}

impl Assembly {
    /// Build the structure described by a summary.
    ///
    /// Values of functions that also exist in `previous` are carried over,
    /// so a summary refresh never blanks readings that are still valid.
    pub fn from_summary(summary: &AssemblySummary, previous: Option<&Assembly>) -> Self {
        let components = summary
            .components
            .iter()
            .map(|component| {
                let old = previous.and_then(|p| p.components.get(&component.id));
                let functions = component
                    .functions
                    .iter()
                    .map(|name| {
                        let value = old
                            .and_then(|c| c.functions.get(name))
                            .cloned()
                            .unwrap_or(Value::Null);
                        (name.clone(), value)
                    })
                    .collect();
                (component.id.clone(), Component { functions })
            })
            .collect();

        Self {
            kind: summary.kind.clone(),
            id: summary.id.clone(),
            error: summary.error.clone(),
            components,
        }
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    /// Populated value at `component/function`.
    pub fn value(&self, component: &str, function: &str) -> Option<&Value> {
        self.components.get(component)?.value(function)
    }

    /// Overwrite values of known functions from a state snapshot.
    ///
    /// Components and functions the summary did not declare are ignored;
    /// known ones absent from the snapshot keep their value.
    pub fn apply_state(&mut self, state: &AssemblyState) {
        for (id, component) in &mut self.components {
            let Some(values) = state.components.get(id) else {
                continue;
            };
            for (name, slot) in &mut component.functions {
                if let Some(value) = values.get(name) {
                    slot.clone_from(value);
                }
            }
        }
    }

    /// Merge a `{components: {id: {function: value}}}` fragment, as found in
    /// command echoes. Returns how many known functions were updated.
    pub fn apply_fragment(&mut self, fragment: &Value) -> usize {
        let Some(components) = fragment.get("components").and_then(Value::as_object) else {
            return 0;
        };

        let mut updated = 0;
        for (id, functions) in components {
            let (Some(component), Some(functions)) =
                (self.components.get_mut(id), functions.as_object())
            else {
                continue;
            };
            for (name, value) in functions {
                if let Some(slot) = component.functions.get_mut(name) {
                    slot.clone_from(value);
                    updated += 1;
                }
            }
        }
        updated
    }
}
