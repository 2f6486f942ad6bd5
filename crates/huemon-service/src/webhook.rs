//! Webhook alert delivery.
//!
//! Each [`MotionAlert`] is POSTed as JSON to a configured URL:
//!
//! ```json
//! {"sensor_id":"…","sensor_name":"Hall","timestamp":"2026-10-18T07:05:09",
//!  "message":"Motion detected by Hall at 18.10.26 07:05:09","target":null}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use huemon_core::{Error, MotionAlert, Notifier, Result};

/// Posts alerts to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &MotionAlert) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notify(format!(
                "webhook returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        debug!("Delivered alert for {} to {}", alert.sensor_name, self.url);
        Ok(())
    }
}
