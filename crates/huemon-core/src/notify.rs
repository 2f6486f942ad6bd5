//! Notifier collaborator interface.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::error::Result;

/// A motion observation that passed the quiet-period filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MotionAlert {
    pub sensor_id: String,
    pub sensor_name: String,
    pub timestamp: NaiveDateTime,
    /// Human-readable message.
    pub message: String,
    /// Where to deliver it, from the sensor's policy settings.
    pub target: Option<String>,
}

impl MotionAlert {
    pub fn new(
        sensor_id: impl Into<String>,
        sensor_name: impl Into<String>,
        timestamp: NaiveDateTime,
        target: Option<String>,
    ) -> Self {
        let sensor_name = sensor_name.into();
        let message = format!(
            "Motion detected by {} at {}",
            sensor_name,
            timestamp.format("%d.%m.%y %H:%M:%S")
        );
        Self {
            sensor_id: sensor_id.into(),
            sensor_name,
            timestamp,
            message,
            target,
        }
    }
}

/// Delivers motion alerts (mail, webhook, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &MotionAlert) -> Result<()>;
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &MotionAlert) -> Result<()> {
        info!(
            target: "huemon::alert",
            sensor = %alert.sensor_name,
            to = alert.target.as_deref().unwrap_or("-"),
            "{}",
            alert.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_alert_message() {
        let ts = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(7, 5, 9)
            .unwrap();
        let alert = MotionAlert::new("s1", "Hall", ts, Some("ops@example.org".into()));
        assert_eq!(alert.message, "Motion detected by Hall at 18.10.26 07:05:09");
        assert_eq!(alert.target.as_deref(), Some("ops@example.org"));
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let ts = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(7, 5, 9)
            .unwrap();
        LogNotifier
            .notify(&MotionAlert::new("s1", "Hall", ts, None))
            .await
            .unwrap();
    }
}
