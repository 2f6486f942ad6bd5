//! Capability kinds exposed by bridge sensors.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// One measurable capability of a sensor.
///
/// Each kind knows where its value lives inside a bridge resource payload:
/// the payload carries a `section` object, which may nest a `<value>_report`
/// object holding the actual `value` field and its `changed` timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ServiceKind {
    /// Battery level reporting (`device_power`). Cannot be disabled.
    #[cfg_attr(feature = "serde", serde(rename = "device_power"))]
    Power,
    /// Ambient light level.
    #[cfg_attr(feature = "serde", serde(rename = "light_level"))]
    Light,
    /// Temperature.
    Temperature,
    /// Motion (presence).
    Motion,
}

impl ServiceKind {
    /// All kinds, in report order.
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Power,
        ServiceKind::Light,
        ServiceKind::Temperature,
        ServiceKind::Motion,
    ];

    /// Map a bridge resource type (`rtype`) to a kind.
    ///
    /// ```
    /// use huemon_types::ServiceKind;
    ///
    /// assert_eq!(ServiceKind::from_rtype("motion"), Some(ServiceKind::Motion));
    /// assert_eq!(ServiceKind::from_rtype("device_power"), Some(ServiceKind::Power));
    /// assert_eq!(ServiceKind::from_rtype("zigbee_connectivity"), None);
    /// ```
    #[must_use]
    pub fn from_rtype(rtype: &str) -> Option<Self> {
        match rtype {
            "device_power" => Some(Self::Power),
            "light_level" => Some(Self::Light),
            "temperature" => Some(Self::Temperature),
            "motion" => Some(Self::Motion),
            _ => None,
        }
    }

    /// Resource type name used in bridge URLs and event payloads.
    #[must_use]
    pub const fn rtype(&self) -> &'static str {
        match self {
            Self::Power => "device_power",
            Self::Light => "light_level",
            Self::Temperature => "temperature",
            Self::Motion => "motion",
        }
    }

    /// Name of the payload section holding this kind's state.
    #[must_use]
    pub const fn section(&self) -> &'static str {
        match self {
            Self::Power => "power_state",
            Self::Light => "light",
            Self::Temperature => "temperature",
            Self::Motion => "motion",
        }
    }

    /// Name of the value field inside the section (or its report object).
    #[must_use]
    pub const fn value_field(&self) -> &'static str {
        match self {
            Self::Power => "battery_level",
            Self::Light => "light_level",
            Self::Temperature => "temperature",
            Self::Motion => "motion",
        }
    }

    /// Name of the nested report object, e.g. `motion_report`.
    #[must_use]
    pub const fn report_field(&self) -> &'static str {
        match self {
            Self::Power => "battery_level_report",
            Self::Light => "light_level_report",
            Self::Temperature => "temperature_report",
            Self::Motion => "motion_report",
        }
    }

    /// Human readable description used in log lines and reports.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Power => "battery",
            Self::Light => "light level",
            Self::Temperature => "temperature",
            Self::Motion => "motion",
        }
    }

    /// Unit suffix appended to rendered values.
    #[must_use]
    pub const fn unit(&self) -> &'static str {
        match self {
            Self::Power => "%",
            Self::Light => " lx",
            Self::Temperature => "°C",
            Self::Motion => "",
        }
    }

    /// Whether the bridge allows this capability to be disabled remotely.
    ///
    /// Power-level reporting is always observed.
    #[must_use]
    pub const fn is_suspendable(&self) -> bool {
        !matches!(self, Self::Power)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rtype())
    }
}

impl FromStr for ServiceKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_rtype(s).ok_or_else(|| ParseError::UnknownServiceKind(s.to_string()))
    }
}
