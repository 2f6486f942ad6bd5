//! Daily CSV export.
//!
//! Each day gets its own directory under the export root, and each sensor
//! one file inside it:
//!
//! ```text
//! <root>/2026-10-18/Hall.csv
//! timestamp,service,value,unit
//! 2026-10-18 07:05:09,motion,true,
//! 2026-10-18 07:05:10,temperature,21.567,°C
//! ```
//!
//! Only samples newer than a service's persisted watermark are written, so
//! a shutdown flush followed by a rollover on the next start never writes a
//! row twice. Existing files are appended to.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use huemon_core::{DaySnapshot, Error, ExportSink, Result, SampleValue, SensorSnapshot};

const HEADER: [&str; 4] = ["timestamp", "service", "value", "unit"];

/// Writes day snapshots as CSV files.
#[derive(Debug, Clone)]
pub struct CsvExport {
    root: PathBuf,
}

impl CsvExport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a sensor's file for the snapshot's day.
    pub fn sensor_path(&self, snapshot: &DaySnapshot, sensor: &SensorSnapshot) -> PathBuf {
        self.root
            .join(snapshot.day.format("%Y-%m-%d").to_string())
            .join(format!("{}.csv", file_stem(&sensor.sensor_name, &sensor.sensor_id)))
    }

    fn write_blocking(&self, snapshot: &DaySnapshot) -> std::result::Result<usize, String> {
        let mut rows = 0;
        for sensor in &snapshot.sensors {
            let pending: Vec<_> = sensor
                .services
                .iter()
                .flat_map(|service| service.unpersisted().map(move |s| (service.kind, s)))
                .filter(|(_, sample)| !sample.value.is_null())
                .collect();
            if pending.is_empty() {
                continue;
            }

            let path = self.sensor_path(snapshot, sensor);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
            }
            let is_new = !path.exists();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| format!("cannot open {}: {}", path.display(), e))?;

            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            let csv_err = |e: csv::Error| format!("cannot write {}: {}", path.display(), e);
            if is_new {
                writer.write_record(HEADER).map_err(csv_err)?;
            }
            for (kind, sample) in &pending {
                writer
                    .write_record([
                        sample.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                        kind.rtype().to_string(),
                        field(&sample.value),
                        kind.unit().trim().to_string(),
                    ])
                    .map_err(csv_err)?;
            }
            writer
                .flush()
                .map_err(|e| format!("cannot flush {}: {}", path.display(), e))?;

            debug!("Wrote {} rows to {}", pending.len(), path.display());
            rows += pending.len();
        }
        Ok(rows)
    }
}

#[async_trait]
impl ExportSink for CsvExport {
    async fn export(&self, snapshot: &DaySnapshot) -> Result<()> {
        let this = self.clone();
        let snapshot = snapshot.clone();
        let day = snapshot.day;
        let rows = tokio::task::spawn_blocking(move || this.write_blocking(&snapshot))
            .await
            .map_err(|e| Error::Export(format!("export task failed: {}", e)))?
            .map_err(Error::Export)?;
        info!("Exported {} rows for {} to {}", rows, day, self.root.display());
        Ok(())
    }
}

/// Unrounded CSV rendering of a value.
fn field(value: &SampleValue) -> String {
    match value {
        SampleValue::Bool(b) => b.to_string(),
        SampleValue::Number(n) => n.to_string(),
        SampleValue::Null => String::new(),
    }
}

/// File-system safe file name for a sensor.
fn file_stem(name: &str, fallback: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('.').trim();
    if stem.is_empty() {
        file_stem_fallback(fallback)
    } else {
        stem.to_string()
    }
}

fn file_stem_fallback(id: &str) -> String {
    let id: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if id.is_empty() { "sensor".to_string() } else { id }
}
