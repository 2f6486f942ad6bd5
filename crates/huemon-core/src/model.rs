//! Entity model: bridge, sensors and their capability services.
//!
//! Ownership runs strictly downwards: a [`Bridge`] owns its [`Sensor`]s, a
//! sensor owns its [`Service`]s. Nothing points back up; code that needs the
//! owning sensor of a service already holds the sensor.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use huemon_types::{IntervalSpec, PolicySettings, Sample, SampleValue, ServiceKind};

use crate::api::BridgeApi;
use crate::clock::Clock;
use crate::error::Result;
use crate::payload;

/// Product name of the bridge's own device record.
pub const BRIDGE_PRODUCT_NAME: &str = "Hue Bridge";

/// Default product name of monitored sensors.
pub const DEFAULT_PRODUCT_NAME: &str = "Hue motion sensor";

/// Remote enabled flag of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnabledState {
    Enabled,
    Disabled,
    /// The capability cannot be disabled (e.g. battery reporting).
    NotApplicable,
}

impl EnabledState {
    /// Derive the state from a kind and the payload's `enabled` field.
    pub fn from_flag(kind: ServiceKind, flag: Option<bool>) -> Self {
        match (kind.is_suspendable(), flag) {
            (false, _) | (true, None) => Self::NotApplicable,
            (true, Some(true)) => Self::Enabled,
            (true, Some(false)) => Self::Disabled,
        }
    }

    /// The state after a successful enable/disable call.
    pub fn from_bool(enabled: bool) -> Self {
        if enabled { Self::Enabled } else { Self::Disabled }
    }
}

/// One capability of a sensor and its current day's samples.
#[derive(Debug, Clone)]
pub struct Service {
    id: String,
    kind: ServiceKind,
    enabled: EnabledState,
    samples: Vec<Sample>,
    /// Last accepted timestamp; survives the daily clear.
    last_timestamp: Option<NaiveDateTime>,
    last_persisted: Option<NaiveDateTime>,
}

impl Service {
    pub fn new(id: impl Into<String>, kind: ServiceKind, enabled: EnabledState) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled,
            samples: Vec::new(),
            last_timestamp: None,
            last_persisted: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn enabled(&self) -> EnabledState {
        self.enabled
    }

    /// Samples of the current observation day, oldest first.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The most recent stored sample.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_timestamp
    }

    /// How far the series has been handed to the export collaborator.
    pub fn last_persisted(&self) -> Option<NaiveDateTime> {
        self.last_persisted
    }

    /// Append a sample if it is strictly newer than the last accepted one.
    ///
    /// Returns `false` (and leaves the series unchanged) otherwise.
    pub fn push(&mut self, sample: Sample) -> bool {
        if self
            .last_timestamp
            .is_some_and(|last| sample.timestamp <= last)
        {
            return false;
        }
        self.last_timestamp = Some(sample.timestamp);
        self.samples.push(sample);
        true
    }

    pub(crate) fn set_enabled(&mut self, state: EnabledState) {
        self.enabled = state;
    }

    /// Remove and return the day's samples. The ordering watermark is kept.
    pub(crate) fn take_samples(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples)
    }

    /// Advance the export watermark; earlier values are ignored.
    pub(crate) fn advance_persisted(&mut self, to: NaiveDateTime) {
        if self.last_persisted.is_none_or(|current| to > current) {
            self.last_persisted = Some(to);
        }
    }

    /// Carry day state over from the previous incarnation of this service.
    pub(crate) fn inherit(&mut self, previous: Service) {
        self.samples = previous.samples;
        self.last_timestamp = previous.last_timestamp;
        self.last_persisted = previous.last_persisted;
    }
}

/// Compiled quiet periods of one sensor.
///
/// A period that fails to parse never matches.
#[derive(Debug, Clone, Default)]
pub struct QuietSchedule {
    dates: Option<IntervalSpec>,
    times: Option<IntervalSpec>,
}

impl QuietSchedule {
    /// Compile the quiet periods in `settings`, warning once per malformed spec.
    pub fn compile(sensor: &str, settings: &PolicySettings) -> Self {
        let parse = |spec: Option<&String>, daily: bool| {
            let spec = spec?;
            match IntervalSpec::parse(spec, daily) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Sensor '{}': ignoring quiet period: {}", sensor, e);
                    None
                }
            }
        };
        Self {
            dates: parse(settings.quiet_dates.as_ref(), false),
            times: parse(settings.quiet_times.as_ref(), true),
        }
    }

    /// True if `now` falls into an absolute or a daily quiet period.
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        self.dates.as_ref().is_some_and(|spec| spec.contains(now))
            || self.times.as_ref().is_some_and(|spec| spec.contains(now))
    }

    /// True if no usable period is configured.
    pub fn is_empty(&self) -> bool {
        self.dates.is_none() && self.times.is_none()
    }
}

/// A physical sensor device.
#[derive(Debug, Clone)]
pub struct Sensor {
    id: String,
    name: String,
    settings: PolicySettings,
    quiet: QuietSchedule,
    services: BTreeMap<ServiceKind, Service>,
}

impl Sensor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, settings: PolicySettings) -> Self {
        let name = name.into();
        let quiet = QuietSchedule::compile(&name, &settings);
        Self {
            id: id.into(),
            name,
            settings,
            quiet,
            services: BTreeMap::new(),
        }
    }

    /// Add a service, replacing an earlier one of the same kind.
    #[must_use]
    pub fn with_service(mut self, service: Service) -> Self {
        self.services.insert(service.kind(), service);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    pub fn quiet_schedule(&self) -> &QuietSchedule {
        &self.quiet
    }

    /// True if `now` is inside one of this sensor's quiet periods.
    pub fn is_quiet(&self, now: NaiveDateTime) -> bool {
        self.quiet.matches(now)
    }

    pub fn service(&self, kind: ServiceKind) -> Option<&Service> {
        self.services.get(&kind)
    }

    pub fn service_mut(&mut self, kind: ServiceKind) -> Option<&mut Service> {
        self.services.get_mut(&kind)
    }

    /// Services in kind order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub(crate) fn services_mut(&mut self) -> impl Iterator<Item = &mut Service> {
        self.services.values_mut()
    }
}

/// Looks up policy settings for a discovered sensor.
pub trait PolicySource: Send + Sync {
    /// Settings for the sensor with this id and display name.
    fn settings_for(&self, id: &str, name: &str) -> PolicySettings;
}

/// Keyed by sensor id first, then by display name.
impl PolicySource for HashMap<String, PolicySettings> {
    fn settings_for(&self, id: &str, name: &str) -> PolicySettings {
        self.get(id).or_else(|| self.get(name)).cloned().unwrap_or_default()
    }
}

/// Every sensor gets default (inert) settings.
impl PolicySource for () {
    fn settings_for(&self, _id: &str, _name: &str) -> PolicySettings {
        PolicySettings::default()
    }
}

/// The bridge and the sensors it exposes.
#[derive(Debug, Clone, Default)]
pub struct Bridge {
    id: Option<String>,
    name: Option<String>,
    sensors: Vec<Sensor>,
    index: HashMap<String, usize>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bridge's own device identity.
    #[must_use]
    pub fn with_identity(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self.name = Some(name.into());
        self
    }

    /// Add a sensor. A sensor with the same id replaces the earlier one.
    #[must_use]
    pub fn with_sensor(mut self, sensor: Sensor) -> Self {
        self.insert(sensor);
        self
    }

    pub(crate) fn insert(&mut self, sensor: Sensor) {
        match self.index.get(sensor.id()) {
            Some(&position) => self.sensors[position] = sensor,
            None => {
                self.index.insert(sensor.id().to_string(), self.sensors.len());
                self.sensors.push(sensor);
            }
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Sensors in discovery order.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub(crate) fn sensors_mut(&mut self) -> impl Iterator<Item = &mut Sensor> {
        self.sensors.iter_mut()
    }

    pub fn sensor(&self, id: &str) -> Option<&Sensor> {
        self.index.get(id).map(|&i| &self.sensors[i])
    }

    pub(crate) fn sensor_mut(&mut self, id: &str) -> Option<&mut Sensor> {
        self.index.get(id).map(|&i| &mut self.sensors[i])
    }

    pub(crate) fn service_mut(&mut self, sensor_id: &str, kind: ServiceKind) -> Option<&mut Service> {
        self.sensor_mut(sensor_id)?.service_mut(kind)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Build the entity model from the bridge.
    ///
    /// Lists devices, keeps those whose product name equals `product_name`,
    /// and creates a service for every capability the monitor tracks. Each
    /// service is seeded with its current value and enabled flag; a failed
    /// status read or a missing value leaves the service without a sample.
    pub async fn discover(
        api: &dyn BridgeApi,
        clock: &dyn Clock,
        product_name: &str,
        policies: &dyn PolicySource,
    ) -> Result<Self> {
        let devices = api.devices().await?;
        let mut bridge = Bridge::new();

        if let Some(device) = devices.iter().find(|d| d.product_name == BRIDGE_PRODUCT_NAME) {
            bridge.id = Some(device.id.clone());
            bridge.name = Some(device.name.clone());
        }

        for device in devices.iter().filter(|d| d.product_name == product_name) {
            let settings = policies.settings_for(&device.id, &device.name);
            let mut sensor = Sensor::new(&device.id, &device.name, settings);

            for service_ref in api.device_services(&device.id).await? {
                let Some(kind) = service_ref.kind() else {
                    continue;
                };
                let service = seed_service(api, clock, &sensor, &service_ref.id, kind).await;
                sensor = sensor.with_service(service);
            }

            debug!(
                "Discovered sensor '{}' ({}) with {} services",
                sensor.name(),
                sensor.id(),
                sensor.services.len()
            );
            bridge.insert(sensor);
        }

        info!(
            "Bridge {}: {} sensors",
            bridge.name().unwrap_or("(unnamed)"),
            bridge.len()
        );
        Ok(bridge)
    }

    /// Current value of every service, one line each, sorted.
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .sensors
            .iter()
            .flat_map(|sensor| {
                sensor.services().filter_map(move |service| {
                    let sample = service.latest()?;
                    Some(format_sample_line(
                        sample,
                        sensor.name(),
                        service.kind(),
                        "",
                    ))
                })
            })
            .collect();
        lines.sort();
        lines
    }
}

async fn seed_service(
    api: &dyn BridgeApi,
    clock: &dyn Clock,
    sensor: &Sensor,
    service_id: &str,
    kind: ServiceKind,
) -> Service {
    let resource = match api.service_state(kind, service_id).await {
        Ok(resource) => resource,
        Err(e) => {
            warn!(
                "Sensor '{}': could not read {} status: {}",
                sensor.name(),
                kind,
                e
            );
            let enabled = EnabledState::from_flag(kind, kind.is_suspendable().then_some(true));
            return Service::new(service_id, kind, enabled);
        }
    };

    let mut service = Service::new(
        service_id,
        kind,
        EnabledState::from_flag(kind, payload::enabled_flag(&resource)),
    );
    match payload::read_section(kind, &resource) {
        Ok(reading) if !reading.value.is_null() => {
            let timestamp = reading
                .changed
                .map(|utc| clock.to_local(utc))
                .unwrap_or_else(|| clock.now());
            service.push(Sample::new(timestamp, reading.value));
        }
        Ok(_) => debug!("Sensor '{}': no initial {} value", sensor.name(), kind),
        Err(e) => debug!("Sensor '{}': no initial {} value: {}", sensor.name(), kind, e),
    }
    service
}

/// Render a sample as a log line:
/// `"<dd.mm.yy HH:MM:SS> <sensor> <description><suffix>: <value><unit>"`.
pub fn format_sample_line(sample: &Sample, sensor: &str, kind: ServiceKind, suffix: &str) -> String {
    let unit = if matches!(sample.value, SampleValue::Null) {
        ""
    } else {
        kind.unit()
    };
    format!(
        "{} {} {}{}: {}{}",
        sample.timestamp.format("%d.%m.%y %H:%M:%S"),
        sensor,
        kind.description(),
        suffix,
        sample.value,
        unit
    )
}
