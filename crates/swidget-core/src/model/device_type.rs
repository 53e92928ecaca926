// ── Device type tags ──
//
// The host assembly's `type` selects one of a closed set of variants.
// Anything outside this table is an unknown device.

use serde::Serialize;
use strum::{Display, EnumString, IntoStaticStr};

/// Host hardware variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Outlet,
    #[strum(to_string = "switch", serialize = "relay_switch")]
    Switch,
    Dimmer,
    #[strum(to_string = "timer_switch", serialize = "pana_switch")]
    TimerSwitch,
}

/// Variant-only operations a device type supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `host/0/level` accepts brightness.
    pub dimmable: bool,
    /// `host/0/timer` accepts a countdown.
    pub countdown_timer: bool,
    /// Every host component reports `power`.
    pub plug_metering: bool,
}

impl DeviceType {
    pub const ALL: [Self; 4] = [Self::Outlet, Self::Switch, Self::Dimmer, Self::TimerSwitch];

    /// Resolve a host `type` tag. `None` for tags outside the table.
    pub fn from_tag(tag: &str) -> Option<Self> {
        tag.parse().ok()
    }

    pub const fn capabilities(self) -> Capabilities {
        match self {
            Self::Outlet => Capabilities {
                dimmable: false,
                countdown_timer: false,
                plug_metering: true,
            },
            Self::Switch => Capabilities {
                dimmable: false,
                countdown_timer: false,
                plug_metering: false,
            },
            Self::Dimmer => Capabilities {
                dimmable: true,
                countdown_timer: false,
                plug_metering: false,
            },
            Self::TimerSwitch => Capabilities {
                dimmable: false,
                countdown_timer: true,
                plug_metering: false,
            },
        }
    }
}
