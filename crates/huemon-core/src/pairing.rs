//! Pairing with the bridge to obtain an application key.
//!
//! The bridge only issues a key within a short window after its physical
//! link button was pressed. [`Pairing::run`] polls a bounded number of
//! times and publishes its progress on a `watch` channel so a UI can tell
//! the user to go and press the button.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Bridge error type for "link button not pressed".
const LINK_BUTTON_NOT_PRESSED: u64 = 101;

/// Keys issued by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The `hue-application-key` for all further requests.
    pub app_key: String,
    /// Entertainment streaming key, if one was generated.
    pub client_key: Option<String>,
}

/// Outcome of one pairing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingResponse {
    Granted(Credentials),
    ButtonNotPressed,
}

/// Parse the body of `POST /api`.
///
/// The bridge answers with a one-element array holding either `success`
/// (`username`, `clientkey`) or `error` (`type`, `description`).
pub fn parse_pairing_response(body: &Value) -> Result<PairingResponse> {
    let entry = body
        .as_array()
        .and_then(|entries| entries.first())
        .ok_or_else(|| Error::invalid_data("pairing response is not a non-empty array"))?;

    if let Some(error) = entry.get("error") {
        if error.get("type").and_then(Value::as_u64) == Some(LINK_BUTTON_NOT_PRESSED) {
            return Ok(PairingResponse::ButtonNotPressed);
        }
        let description = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown pairing error");
        return Err(Error::Pairing(description.to_string()));
    }

    let success = entry
        .get("success")
        .ok_or_else(|| Error::invalid_data("pairing response has neither success nor error"))?;
    let app_key = success
        .get("username")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_data("pairing success without username"))?;
    Ok(PairingResponse::Granted(Credentials {
        app_key: app_key.to_string(),
        client_key: success
            .get("clientkey")
            .and_then(Value::as_str)
            .map(String::from),
    }))
}

/// The single request pairing needs.
#[async_trait]
pub trait PairingApi: Send + Sync {
    /// `POST api {devicetype, generateclientkey}`.
    async fn request_key(&self, device_type: &str) -> Result<PairingResponse>;
}

/// Progress of a pairing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingStatus {
    /// Not started.
    Idle,
    /// A request is in flight.
    Requesting { attempt: u32, max: u32 },
    /// The bridge wants its link button pressed.
    AwaitingButton { attempt: u32, max: u32 },
    Paired,
    Failed(String),
}

impl PairingStatus {
    /// True once the run has ended, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Paired | Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Application identifier sent as `devicetype` (`app#instance`).
    pub device_type: String,
    pub max_attempts: u32,
    /// Wait between attempts.
    pub interval: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            device_type: "huemon#service".to_string(),
            max_attempts: 30,
            interval: Duration::from_secs(5),
        }
    }
}

/// Bounded pairing state machine.
pub struct Pairing {
    api: Arc<dyn PairingApi>,
    config: PairingConfig,
    status: watch::Sender<PairingStatus>,
}

impl Pairing {
    pub fn new(api: Arc<dyn PairingApi>, config: PairingConfig) -> Self {
        let (status, _) = watch::channel(PairingStatus::Idle);
        Self {
            api,
            config,
            status,
        }
    }

    /// Watch the pairing progress.
    pub fn subscribe(&self) -> watch::Receiver<PairingStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> PairingStatus {
        self.status.borrow().clone()
    }

    fn publish(&self, status: PairingStatus) {
        self.status.send_replace(status);
    }

    /// Poll the bridge until it grants a key, the attempts run out or
    /// `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Credentials> {
        let max = self.config.max_attempts.max(1);

        for attempt in 1..=max {
            self.publish(PairingStatus::Requesting { attempt, max });

            let response = tokio::select! {
                _ = cancel.cancelled() => return self.fail(Error::Cancelled),
                response = self.api.request_key(&self.config.device_type) => response,
            };

            match response {
                Ok(PairingResponse::Granted(credentials)) => {
                    info!("Paired with bridge");
                    self.publish(PairingStatus::Paired);
                    return Ok(credentials);
                }
                Ok(PairingResponse::ButtonNotPressed) => {
                    if attempt == 1 {
                        info!("Press the link button on the bridge");
                    }
                    self.publish(PairingStatus::AwaitingButton { attempt, max });
                }
                Err(e) if e.is_retryable() => {
                    warn!("Pairing request failed (attempt {}/{}): {}", attempt, max, e);
                }
                Err(e) => return self.fail(e),
            }

            if attempt < max {
                tokio::select! {
                    _ = cancel.cancelled() => return self.fail(Error::Cancelled),
                    _ = tokio::time::sleep(self.config.interval) => {}
                }
            }
        }

        self.fail(Error::Pairing(format!(
            "link button not pressed after {} attempts",
            max
        )))
    }

    fn fail(&self, error: Error) -> Result<Credentials> {
        self.publish(PairingStatus::Failed(error.to_string()));
        Err(error)
    }
}
