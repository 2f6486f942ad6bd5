//! Export collaborator interface.
//!
//! At rollover and at shutdown the aggregator hands an immutable
//! [`DaySnapshot`] to an [`ExportSink`]. The snapshot is taken under the
//! model lock; the export itself runs after the lock is released.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use huemon_types::{MotionProfile, Sample, ServiceKind};

use crate::error::Result;

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportReason {
    /// The day ended; the series have been cleared.
    Rollover,
    /// Orderly shutdown; the series are still live.
    Shutdown,
}

/// One service's samples for the day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSnapshot {
    pub service_id: String,
    pub kind: ServiceKind,
    pub samples: Vec<Sample>,
    /// Samples at or before this instant were exported earlier.
    pub last_persisted: Option<NaiveDateTime>,
}

impl ServiceSnapshot {
    /// Samples newer than the watermark.
    pub fn unpersisted(&self) -> impl Iterator<Item = &Sample> {
        let watermark = self.last_persisted;
        self.samples
            .iter()
            .filter(move |s| watermark.is_none_or(|w| s.timestamp > w))
    }
}

/// One sensor's services for the day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub sensor_id: String,
    pub sensor_name: String,
    pub services: Vec<ServiceSnapshot>,
}

/// Everything the aggregator held for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySnapshot {
    pub day: NaiveDate,
    pub reason: ExportReason,
    pub sensors: Vec<SensorSnapshot>,
    #[serde(skip)]
    pub profile: MotionProfile,
}

impl DaySnapshot {
    /// Total number of samples across all services.
    pub fn sample_count(&self) -> usize {
        self.sensors
            .iter()
            .flat_map(|sensor| &sensor.services)
            .map(|service| service.samples.len())
            .sum()
    }

    /// The newest sample timestamp per service, for advancing watermarks.
    pub fn high_water_marks(&self) -> Vec<(String, ServiceKind, NaiveDateTime)> {
        self.sensors
            .iter()
            .flat_map(|sensor| {
                sensor.services.iter().filter_map(|service| {
                    let last = service.samples.last()?;
                    Some((sensor.sensor_id.clone(), service.kind, last.timestamp))
                })
            })
            .collect()
    }
}

/// Receives day snapshots for persistence or reporting.
#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn export(&self, snapshot: &DaySnapshot) -> Result<()>;
}

/// Discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExport;

#[async_trait]
impl ExportSink for NullExport {
    async fn export(&self, _snapshot: &DaySnapshot) -> Result<()> {
        Ok(())
    }
}
