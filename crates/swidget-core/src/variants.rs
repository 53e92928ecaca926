// ── Typed device variants ──
//
// Each variant wraps a `Device` whose host type matched the tag table
// and adds the operations only that hardware supports. The shared
// capability set (on/off, readings) is reached through `Deref`.

use std::ops::Deref;

use serde_json::json;
use swidget_api::models::AssemblyKind;

use crate::device::Device;
use crate::error::CoreError;
use crate::model::DeviceType;
use crate::store::PRIMARY_COMPONENT;

macro_rules! device_variant {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(Device);

        impl $name {
            pub fn device(&self) -> &Device {
                &self.0
            }

            pub fn into_device(self) -> Device {
                self.0
            }
        }

        impl Deref for $name {
            type Target = Device;

            fn deref(&self) -> &Device {
                &self.0
            }
        }
    };
}

device_variant!(
    /// Wall outlet with per-plug power metering.
    Outlet
);
device_variant!(
    /// Plain relay switch.
    Switch
);
device_variant!(
    /// Dimmer with a 0-100 level.
    Dimmer
);
device_variant!(
    /// Switch with a countdown timer.
    TimerSwitch
);

impl Outlet {
    /// Host component ids, one per plug.
    pub fn plugs(&self) -> Vec<String> {
        self.snapshot().host.components.keys().cloned().collect()
    }
}

impl Dimmer {
    /// Set `host/0/level` to `brightness` percent.
    pub async fn set_brightness(&self, brightness: u8) -> Result<(), CoreError> {
        if brightness > 100 {
            return Err(CoreError::ValidationFailed {
                message: format!("brightness must be 0-100, got {brightness}"),
            });
        }
        self.send_command(
            AssemblyKind::Host,
            PRIMARY_COMPONENT,
            "level",
            json!({ "now": brightness }),
        )
        .await
    }
}

impl TimerSwitch {
    /// Turn the load off after `minutes`.
    pub async fn set_countdown_timer(&self, minutes: u32) -> Result<(), CoreError> {
        self.send_command(
            AssemblyKind::Host,
            PRIMARY_COMPONENT,
            "timer",
            json!({ "duration": minutes }),
        )
        .await
    }
}

// ── TypedDevice ──────────────────────────────────────────────────────

/// A device resolved to its concrete variant.
#[derive(Debug, Clone)]
pub enum TypedDevice {
    Outlet(Outlet),
    Switch(Switch),
    Dimmer(Dimmer),
    TimerSwitch(TimerSwitch),
}

impl TypedDevice {
    /// Select the variant from the host type tag.
    pub fn from_device(device: Device) -> Result<Self, CoreError> {
        let snapshot = device.snapshot();
        let Some(device_type) = snapshot.device_type() else {
            return Err(CoreError::UnknownDeviceType {
                device_type: snapshot.device_type_tag().to_owned(),
            });
        };
        Ok(match device_type {
            DeviceType::Outlet => Self::Outlet(Outlet(device)),
            DeviceType::Switch => Self::Switch(Switch(device)),
            DeviceType::Dimmer => Self::Dimmer(Dimmer(device)),
            DeviceType::TimerSwitch => Self::TimerSwitch(TimerSwitch(device)),
        })
    }

    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Outlet(_) => DeviceType::Outlet,
            Self::Switch(_) => DeviceType::Switch,
            Self::Dimmer(_) => DeviceType::Dimmer,
            Self::TimerSwitch(_) => DeviceType::TimerSwitch,
        }
    }

    pub fn device(&self) -> &Device {
        match self {
            Self::Outlet(d) => d.device(),
            Self::Switch(d) => d.device(),
            Self::Dimmer(d) => d.device(),
            Self::TimerSwitch(d) => d.device(),
        }
    }

    pub fn into_device(self) -> Device {
        match self {
            Self::Outlet(d) => d.into_device(),
            Self::Switch(d) => d.into_device(),
            Self::Dimmer(d) => d.into_device(),
            Self::TimerSwitch(d) => d.into_device(),
        }
    }

    pub fn as_outlet(&self) -> Option<&Outlet> {
        match self {
            Self::Outlet(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dimmer(&self) -> Option<&Dimmer> {
        match self {
            Self::Dimmer(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_timer_switch(&self) -> Option<&TimerSwitch> {
        match self {
            Self::TimerSwitch(d) => Some(d),
            _ => None,
        }
    }
}

impl Deref for TypedDevice {
    type Target = Device;

    fn deref(&self) -> &Device {
        self.device()
    }
}
