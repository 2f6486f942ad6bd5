//! Day-scoped aggregation of sensor samples.
//!
//! The [`Aggregator`] owns the entity model behind a single `RwLock`. The
//! stream client appends samples through [`Aggregator::apply`]; the policy
//! engine reads sensor settings and records enabled-flag changes. Day
//! rollover clears every series under the write lock and hands a private
//! snapshot to the export collaborator after the lock is released.
//!
//! No bridge call is ever made while the lock is held.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use huemon_types::{MotionProfile, Sample, SampleValue, ServiceKind};

use crate::api::BridgeApi;
use crate::clock::Clock;
use crate::error::Result;
use crate::events::{EventDispatcher, MonitorEvent};
use crate::export::{DaySnapshot, ExportReason, ExportSink, SensorSnapshot, ServiceSnapshot};
use crate::model::{Bridge, EnabledState, PolicySource, format_sample_line};
use crate::notify::MotionAlert;
use crate::payload;

/// Result of [`Aggregator::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The sample was appended.
    Stored,
    /// The sample was not newer than the last stored one.
    OutOfOrder,
    /// No such sensor or service in the current topology.
    UnknownEntity,
}

impl ApplyOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Counters since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorStats {
    pub stored: u64,
    pub rejected: u64,
    /// Records dropped because their entity was unknown or malformed.
    pub skipped: u64,
    pub rollovers: u64,
}

/// How to rebuild the model from the bridge during a resync.
#[derive(Clone)]
pub struct Discovery {
    pub product_name: String,
    pub policies: Arc<dyn PolicySource>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("product_name", &self.product_name)
            .finish_non_exhaustive()
    }
}

struct DayState {
    bridge: Bridge,
    day: NaiveDate,
}

/// Owner of the entity model and its day-scoped state.
pub struct Aggregator {
    state: RwLock<DayState>,
    clock: Arc<dyn Clock>,
    exporter: Arc<dyn ExportSink>,
    discovery: Option<Discovery>,
    events: EventDispatcher,
    stored: AtomicU64,
    rejected: AtomicU64,
    skipped: AtomicU64,
    rollovers: AtomicU64,
}

impl Aggregator {
    /// Create an aggregator for `bridge`; the observation day starts today.
    pub fn new(bridge: Bridge, clock: Arc<dyn Clock>, exporter: Arc<dyn ExportSink>) -> Self {
        let day = clock.today();
        Self {
            state: RwLock::new(DayState { bridge, day }),
            clock,
            exporter,
            discovery: None,
            events: EventDispatcher::default(),
            stored: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            rollovers: AtomicU64::new(0),
        }
    }

    /// Enable resync after rollover using these discovery parameters.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Publish events on an existing dispatcher.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// The day whose samples are currently buffered.
    pub async fn day(&self) -> NaiveDate {
        self.state.read().await.day
    }

    /// Run `f` against the model under the read lock.
    pub async fn read<R>(&self, f: impl FnOnce(&Bridge) -> R) -> R {
        let state = self.state.read().await;
        f(&state.bridge)
    }

    /// Append a sample to a service's series.
    pub async fn apply(
        &self,
        sensor_id: &str,
        kind: ServiceKind,
        timestamp: NaiveDateTime,
        value: SampleValue,
    ) -> ApplyOutcome {
        let sample = Sample::new(timestamp, value);
        let line = {
            let mut state = self.state.write().await;
            let Some(sensor) = state.bridge.sensor_mut(sensor_id) else {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return ApplyOutcome::UnknownEntity;
            };
            let name = sensor.name().to_string();
            let Some(service) = sensor.service_mut(kind) else {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return ApplyOutcome::UnknownEntity;
            };
            if !service.push(sample) {
                None
            } else {
                Some(format_sample_line(&sample, &name, kind, " - new value"))
            }
        };

        match line {
            Some(line) => {
                self.stored.fetch_add(1, Ordering::Relaxed);
                info!("{}", line);
                self.events.send(MonitorEvent::SampleStored {
                    sensor_id: sensor_id.to_string(),
                    kind,
                    timestamp,
                    value,
                });
                ApplyOutcome::Stored
            }
            None => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!("Rejected out-of-order {} sample for {} at {}", kind, sensor_id, timestamp);
                self.events.send(MonitorEvent::SampleRejected {
                    sensor_id: sensor_id.to_string(),
                    kind,
                    timestamp,
                });
                ApplyOutcome::OutOfOrder
            }
        }
    }

    /// Count a record that never reached [`apply`](Self::apply).
    pub fn note_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// The alert to send for motion observed at `timestamp`, if any.
    ///
    /// An alert is due when the sensor notifies and `timestamp` lies
    /// outside all of its quiet periods.
    pub async fn alert_for(&self, sensor_id: &str, timestamp: NaiveDateTime) -> Option<MotionAlert> {
        let state = self.state.read().await;
        let sensor = state.bridge.sensor(sensor_id)?;
        if !sensor.settings().notify || sensor.is_quiet(timestamp) {
            return None;
        }
        Some(MotionAlert::new(
            sensor.id(),
            sensor.name(),
            timestamp,
            sensor.settings().target.clone(),
        ))
    }

    /// Record an enabled-flag change made on the bridge.
    ///
    /// Returns `true` if the stored state changed.
    pub async fn set_enabled(&self, sensor_id: &str, kind: ServiceKind, state: EnabledState) -> bool {
        let mut guard = self.state.write().await;
        match guard.bridge.service_mut(sensor_id, kind) {
            Some(service) if service.enabled() != state => {
                service.set_enabled(state);
                true
            }
            _ => false,
        }
    }

    /// Occupancy of the current day, merged across all motion services.
    pub async fn current_profile(&self) -> MotionProfile {
        let state = self.state.read().await;
        day_profile(&state.bridge, state.day)
    }

    /// Perform the day transition if the local date has changed.
    ///
    /// Clears every series and resets the motion profile, then hands the
    /// ended day to the export collaborator. With `force` the transition
    /// happens even within the same day. Returns whether it happened.
    pub async fn rollover(&self, force: bool) -> bool {
        let today = self.clock.today();
        if !force && self.state.read().await.day == today {
            return false;
        }

        let snapshot = {
            let mut state = self.state.write().await;
            // another task may have won the race for the write lock
            if !force && state.day == today {
                return false;
            }
            let ended = state.day;
            let snapshot = take_snapshot(&state.bridge, ended, ExportReason::Rollover);
            for sensor in state.bridge.sensors_mut() {
                for service in sensor.services_mut() {
                    service.take_samples();
                }
            }
            state.day = today;
            snapshot
        };

        self.rollovers.fetch_add(1, Ordering::Relaxed);
        info!("{}", snapshot.day.format("%d.%m.%y"));
        info!("{}", snapshot.profile.render());
        info!("{}", MotionProfile::timeline());
        info!(
            "Day {} closed with {} samples",
            snapshot.day,
            snapshot.sample_count()
        );

        self.hand_off(&snapshot).await;
        self.events.send(MonitorEvent::RolledOver { day: snapshot.day });
        true
    }

    /// Hand the current day to the export collaborator without clearing it.
    pub async fn flush(&self) -> Result<()> {
        let snapshot = {
            let state = self.state.read().await;
            take_snapshot(&state.bridge, state.day, ExportReason::Shutdown)
        };
        self.exporter.export(&snapshot).await?;
        self.advance_watermarks(&snapshot).await;
        Ok(())
    }

    async fn hand_off(&self, snapshot: &DaySnapshot) {
        match self.exporter.export(snapshot).await {
            Ok(()) => self.advance_watermarks(snapshot).await,
            Err(e) => warn!("Export of {} failed: {}", snapshot.day, e),
        }
    }

    async fn advance_watermarks(&self, snapshot: &DaySnapshot) {
        let marks = snapshot.high_water_marks();
        let mut state = self.state.write().await;
        for (sensor_id, kind, timestamp) in marks {
            if let Some(service) = state.bridge.service_mut(&sensor_id, kind) {
                service.advance_persisted(timestamp);
            }
        }
    }

    /// Maintenance after a real rollover: resync the topology and record
    /// the daily battery levels. Failures are logged.
    pub async fn after_rollover(&self, api: &dyn BridgeApi) {
        if let Err(e) = self.resync(api).await {
            warn!("Resync after rollover failed: {}", e);
        }
        self.refresh_power_levels(api).await;
    }

    /// Rebuild the sensor list from the bridge.
    ///
    /// Services whose id survives keep their day samples and watermarks.
    /// Without discovery parameters this is a no-op returning `false`.
    pub async fn resync(&self, api: &dyn BridgeApi) -> Result<bool> {
        let Some(discovery) = &self.discovery else {
            return Ok(false);
        };
        let fresh = Bridge::discover(
            api,
            self.clock.as_ref(),
            &discovery.product_name,
            discovery.policies.as_ref(),
        )
        .await?;

        let mut state = self.state.write().await;
        let mut rebuilt = fresh;
        for sensor in rebuilt.sensors_mut() {
            let Some(old) = state.bridge.sensor(sensor.id()) else {
                continue;
            };
            for service in sensor.services_mut() {
                if let Some(previous) = old
                    .service(service.kind())
                    .filter(|s| s.id() == service.id())
                {
                    service.inherit(previous.clone());
                }
            }
        }
        info!(
            "Resynced topology: {} -> {} sensors",
            state.bridge.len(),
            rebuilt.len()
        );
        state.bridge = rebuilt;
        Ok(true)
    }

    /// Read every sensor's battery level and append it to the day's series.
    pub async fn refresh_power_levels(&self, api: &dyn BridgeApi) {
        let targets: Vec<(String, String)> = self
            .read(|bridge| {
                bridge
                    .sensors()
                    .iter()
                    .filter_map(|sensor| {
                        let service = sensor.service(ServiceKind::Power)?;
                        Some((sensor.id().to_string(), service.id().to_string()))
                    })
                    .collect()
            })
            .await;

        for (sensor_id, service_id) in targets {
            let reading = api
                .service_state(ServiceKind::Power, &service_id)
                .await
                .and_then(|resource| payload::read_section(ServiceKind::Power, &resource));
            match reading {
                Ok(reading) => {
                    let now = self.clock.now();
                    self.apply(&sensor_id, ServiceKind::Power, now, reading.value)
                        .await;
                }
                Err(e) => warn!("Battery check for {} failed: {}", sensor_id, e),
            }
        }
    }

    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            stored: self.stored.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rollovers: self.rollovers.load(Ordering::Relaxed),
        }
    }
}

fn day_profile(bridge: &Bridge, day: NaiveDate) -> MotionProfile {
    let mut profile = MotionProfile::new();
    for sensor in bridge.sensors() {
        if let Some(motion) = sensor.service(ServiceKind::Motion) {
            profile.extend(
                motion
                    .samples()
                    .iter()
                    .filter(|s| s.timestamp.date() == day),
            );
        }
    }
    profile
}

fn take_snapshot(bridge: &Bridge, day: NaiveDate, reason: ExportReason) -> DaySnapshot {
    let profile = day_profile(bridge, day);
    let sensors = bridge
        .sensors()
        .iter()
        .map(|sensor| SensorSnapshot {
            sensor_id: sensor.id().to_string(),
            sensor_name: sensor.name().to_string(),
            services: sensor
                .services()
                .map(|service| ServiceSnapshot {
                    service_id: service.id().to_string(),
                    kind: service.kind(),
                    samples: service.samples().to_vec(),
                    last_persisted: service.last_persisted(),
                })
                .collect(),
        })
        .collect();
    DaySnapshot {
        day,
        reason,
        sensors,
        profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::export::NullExport;
    use crate::mock::RecordingExport;
    use crate::model::{Sensor, Service};
    use chrono::TimeDelta;
    use huemon_types::PolicySettings;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn bridge(settings: PolicySettings) -> Bridge {
        Bridge::new().with_sensor(
            Sensor::new("s1", "Hall", settings)
                .with_service(Service::new("m1", ServiceKind::Motion, EnabledState::Enabled))
                .with_service(Service::new("p1", ServiceKind::Power, EnabledState::NotApplicable)),
        )
    }

    #[tokio::test]
    async fn test_apply_and_stats() {
        let clock = Arc::new(ManualClock::new(at(18, 12, 0)));
        let agg = Aggregator::new(bridge(PolicySettings::default()), clock, Arc::new(NullExport));

        let motion = ServiceKind::Motion;
        assert_eq!(agg.apply("s1", motion, at(18, 3, 7), true.into()).await, ApplyOutcome::Stored);
        assert_eq!(agg.apply("s1", motion, at(18, 3, 7), true.into()).await, ApplyOutcome::OutOfOrder);
        assert_eq!(agg.apply("zz", motion, at(18, 4, 0), true.into()).await, ApplyOutcome::UnknownEntity);
        assert_eq!(
            agg.apply("s1", ServiceKind::Light, at(18, 4, 0), 12.0.into()).await,
            ApplyOutcome::UnknownEntity
        );

        let stats = agg.stats();
        assert_eq!((stats.stored, stats.rejected, stats.skipped), (1, 1, 2));
    }

    #[tokio::test]
    async fn test_current_profile() {
        let clock = Arc::new(ManualClock::new(at(18, 20, 0)));
        let agg = Aggregator::new(bridge(PolicySettings::default()), clock, Arc::new(NullExport));

        for (h, m) in [(3, 7), (3, 10), (14, 59)] {
            agg.apply("s1", ServiceKind::Motion, at(18, h, m), true.into()).await;
        }
        agg.apply("s1", ServiceKind::Motion, at(18, 16, 0), false.into()).await;

        let profile = agg.current_profile().await;
        assert_eq!(profile.occupied().collect::<Vec<_>>(), vec![12, 59]);
    }

    #[tokio::test]
    async fn test_rollover_is_idempotent() {
        let clock = Arc::new(ManualClock::new(at(18, 23, 50)));
        let export = Arc::new(RecordingExport::default());
        let agg = Aggregator::new(bridge(PolicySettings::default()), clock.clone(), export.clone());
        let mut events = agg.events().subscribe();

        agg.apply("s1", ServiceKind::Motion, at(18, 23, 55), true.into()).await;
        assert!(!agg.rollover(false).await);

        clock.advance(TimeDelta::minutes(15));
        assert!(agg.rollover(false).await);
        assert!(!agg.rollover(false).await);

        assert_eq!(agg.day().await, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert!(agg.current_profile().await.is_empty());
        agg.read(|b| assert!(b.sensors()[0].service(ServiceKind::Motion).unwrap().samples().is_empty()))
            .await;

        let snapshots = export.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].sample_count(), 1);
        assert!(snapshots[0].profile.is_occupied(95));
        assert_eq!(agg.stats().rollovers, 1);

        let mut rolled = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, MonitorEvent::RolledOver { .. }) {
                rolled += 1;
            }
        }
        assert_eq!(rolled, 1);
    }

    #[tokio::test]
    async fn test_rollover_advances_watermark_and_keeps_ordering() {
        let clock = Arc::new(ManualClock::new(at(18, 23, 50)));
        let agg = Aggregator::new(
            bridge(PolicySettings::default()),
            clock.clone(),
            Arc::new(RecordingExport::default()),
        );
        agg.apply("s1", ServiceKind::Motion, at(18, 23, 55), true.into()).await;
        clock.advance(TimeDelta::minutes(15));
        assert!(agg.rollover(false).await);

        agg.read(|b| {
            let motion = b.sensors()[0].service(ServiceKind::Motion).unwrap();
            assert_eq!(motion.last_persisted(), Some(at(18, 23, 55)));
        })
        .await;
        // a replayed pre-midnight sample stays rejected
        assert_eq!(
            agg.apply("s1", ServiceKind::Motion, at(18, 23, 55), true.into()).await,
            ApplyOutcome::OutOfOrder
        );
    }

    #[tokio::test]
    async fn test_forced_rollover_same_day() {
        let clock = Arc::new(ManualClock::new(at(18, 10, 0)));
        let agg = Aggregator::new(bridge(PolicySettings::default()), clock, Arc::new(NullExport));
        agg.apply("s1", ServiceKind::Motion, at(18, 9, 0), true.into()).await;
        assert!(agg.rollover(true).await);
        assert!(agg.current_profile().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_export_keeps_watermark() {
        let clock = Arc::new(ManualClock::new(at(18, 23, 50)));
        let export = Arc::new(RecordingExport::failing());
        let agg = Aggregator::new(bridge(PolicySettings::default()), clock.clone(), export);
        agg.apply("s1", ServiceKind::Motion, at(18, 23, 55), true.into()).await;
        clock.advance(TimeDelta::minutes(15));
        assert!(agg.rollover(false).await);
        agg.read(|b| {
            let motion = b.sensors()[0].service(ServiceKind::Motion).unwrap();
            assert_eq!(motion.last_persisted(), None);
        })
        .await;
    }

    #[tokio::test]
    async fn test_flush_does_not_clear() {
        let clock = Arc::new(ManualClock::new(at(18, 12, 0)));
        let export = Arc::new(RecordingExport::default());
        let agg = Aggregator::new(bridge(PolicySettings::default()), clock, export.clone());
        agg.apply("s1", ServiceKind::Motion, at(18, 11, 0), true.into()).await;
        agg.flush().await.unwrap();

        assert_eq!(export.snapshots()[0].reason, ExportReason::Shutdown);
        agg.read(|b| assert_eq!(b.sensors()[0].service(ServiceKind::Motion).unwrap().samples().len(), 1))
            .await;
    }

    #[tokio::test]
    async fn test_alert_for_respects_notify_and_quiet() {
        let clock = Arc::new(ManualClock::new(at(18, 12, 0)));
        let settings = PolicySettings {
            notify: true,
            target: Some("ops".into()),
            quiet_times: Some("22:00-23:00".into()),
            ..Default::default()
        };
        let agg = Aggregator::new(bridge(settings), clock, Arc::new(NullExport));

        let alert = agg.alert_for("s1", at(18, 12, 0)).await.unwrap();
        assert_eq!(alert.target.as_deref(), Some("ops"));
        assert!(agg.alert_for("s1", at(18, 22, 30)).await.is_none());
        assert!(agg.alert_for("nobody", at(18, 12, 0)).await.is_none());
    }

    #[tokio::test]
    async fn test_set_enabled_reports_change() {
        let clock = Arc::new(ManualClock::new(at(18, 12, 0)));
        let agg = Aggregator::new(bridge(PolicySettings::default()), clock, Arc::new(NullExport));
        assert!(agg.set_enabled("s1", ServiceKind::Motion, EnabledState::Disabled).await);
        assert!(!agg.set_enabled("s1", ServiceKind::Motion, EnabledState::Disabled).await);
    }
}
