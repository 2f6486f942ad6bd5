//! HTTPS client for the bridge's CLIP v2 API.
//!
//! The bridge serves a self-signed certificate, so certificate validation
//! is disabled. Short calls carry a per-request timeout; the event stream
//! has only a connect timeout since it is meant to stay open.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::{Value, json};
use tracing::debug;

use huemon_types::ServiceKind;

use crate::api::{BridgeApi, DeviceRecord, EventStream, ServiceRef};
use crate::error::{Error, Result};
use crate::pairing::{PairingApi, PairingResponse, parse_pairing_response};
use crate::payload;

/// Header carrying the application key.
pub const APP_KEY_HEADER: &str = "hue-application-key";

/// Default bound for short requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

fn base_url(address: &str) -> Result<String> {
    let address = address.trim().trim_end_matches('/');
    if address.is_empty() {
        return Err(Error::invalid_config("bridge address is empty"));
    }
    if address.starts_with("https://") || address.starts_with("http://") {
        Ok(address.to_string())
    } else {
        Ok(format!("https://{}", address))
    }
}

fn build_client(connect_timeout: Duration) -> Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(true)
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| Error::invalid_config(format!("cannot build HTTP client: {}", e)))
}

async fn handle_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else {
        Err(Error::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

/// Authenticated bridge client.
#[derive(Debug, Clone)]
pub struct HttpBridge {
    client: Client,
    base_url: String,
    app_key: String,
    request_timeout: Duration,
}

impl HttpBridge {
    /// Create a client for the bridge at `address` (host, IP or URL).
    pub fn new(address: &str, app_key: &str) -> Result<Self> {
        Self::with_timeout(address, app_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(address: &str, app_key: &str, request_timeout: Duration) -> Result<Self> {
        if app_key.is_empty() {
            return Err(Error::invalid_config("application key is empty"));
        }
        Ok(Self {
            client: build_client(request_timeout)?,
            base_url: base_url(address)?,
            app_key: app_key.to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resource_url(&self, path: &str) -> String {
        format!("{}/clip/v2/resource/{}", self.base_url, path)
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(APP_KEY_HEADER, &self.app_key)
            .timeout(self.request_timeout)
            .send()
            .await?;
        handle_response(response).await
    }
}

#[async_trait]
impl BridgeApi for HttpBridge {
    async fn devices(&self) -> Result<Vec<DeviceRecord>> {
        let body = self.get_json(&self.resource_url("device")).await?;
        payload::parse_devices(&body)
    }

    async fn device_services(&self, device_id: &str) -> Result<Vec<ServiceRef>> {
        let url = self.resource_url(&format!("device/{}", device_id));
        let body = self.get_json(&url).await?;
        payload::parse_device_services(&body)
    }

    async fn service_state(&self, kind: ServiceKind, service_id: &str) -> Result<Value> {
        let url = self.resource_url(&format!("{}/{}", kind.rtype(), service_id));
        let body = self.get_json(&url).await?;
        payload::data_items(&body)?
            .first()
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(service_id.to_string()))
    }

    async fn set_enabled(&self, kind: ServiceKind, service_id: &str, enabled: bool) -> Result<()> {
        let url = self.resource_url(&format!("{}/{}", kind.rtype(), service_id));
        debug!("PUT {} enabled={}", url, enabled);
        let response = self
            .client
            .put(&url)
            .header(APP_KEY_HEADER, &self.app_key)
            .json(&json!({ "enabled": enabled }))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let body = handle_response(response).await?;
        payload::data_items(&body)?;
        Ok(())
    }

    async fn event_stream(&self) -> Result<EventStream> {
        let url = format!("{}/eventstream/clip/v2", self.base_url);
        debug!("Opening event stream {}", url);
        let response = self
            .client
            .get(&url)
            .header(APP_KEY_HEADER, &self.app_key)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed())
    }
}

/// Unauthenticated client used only for pairing.
#[derive(Debug, Clone)]
pub struct HttpPairing {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpPairing {
    pub fn new(address: &str, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
            base_url: base_url(address)?,
            request_timeout,
        })
    }
}

#[async_trait]
impl PairingApi for HttpPairing {
    async fn request_key(&self, device_type: &str) -> Result<PairingResponse> {
        let url = format!("{}/api", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "devicetype": device_type, "generateclientkey": true }))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let body = handle_response(response).await?;
        parse_pairing_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(base_url("192.168.1.2").unwrap(), "https://192.168.1.2");
        assert_eq!(base_url("https://bridge.local/").unwrap(), "https://bridge.local");
        assert!(matches!(base_url("  "), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_resource_url() {
        let bridge = HttpBridge::new("10.0.0.5", "key").unwrap();
        assert_eq!(bridge.base_url(), "https://10.0.0.5");
        assert_eq!(
            bridge.resource_url("motion/abc"),
            "https://10.0.0.5/clip/v2/resource/motion/abc"
        );
    }

    #[test]
    fn test_empty_app_key_rejected() {
        assert!(HttpBridge::new("10.0.0.5", "").is_err());
    }
}
