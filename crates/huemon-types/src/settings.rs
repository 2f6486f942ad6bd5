//! Per-sensor policy settings.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Alerting and suspension policy for one sensor.
///
/// Settings are fixed for the lifetime of a sensor; changing them means
/// rebuilding the sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PolicySettings {
    /// Send a notification when motion is observed outside quiet periods.
    pub notify: bool,
    /// Where notifications for this sensor go (address, channel, ...).
    pub target: Option<String>,
    /// Absolute quiet periods, e.g. `2026-12-24-2026-12-26`.
    pub quiet_dates: Option<String>,
    /// Daily quiet periods, e.g. `22:00-23:00, 06:00-07:00`.
    pub quiet_times: Option<String>,
    /// Disable suspendable capabilities on the bridge during quiet periods.
    pub suspend: bool,
}

impl PolicySettings {
    /// True if any quiet period is configured.
    #[must_use]
    pub fn has_quiet_periods(&self) -> bool {
        self.quiet_dates.is_some() || self.quiet_times.is_some()
    }
}
