//! Event stream client.
//!
//! Keeps one long-lived connection to the bridge's event endpoint open,
//! splits the byte stream into lines and dispatches every `update` record to
//! the [`Aggregator`].
//!
//! # Reconnection
//!
//! | Condition | Action |
//! |-----------|--------|
//! | No data for the idle timeout | Reconnect at once (normal operation) |
//! | Server closed the stream | Reconnect; back off if it sent nothing |
//! | Transient request error | Log, back off, reconnect |
//! | Transport lost ([`Error::ConnectionFailed`]) | Return the error |
//! | Malformed or unknown record | Skip that record only |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use huemon_core::{Aggregator, Bridge, HttpBridge, LogNotifier, NullExport, StreamClient, SystemClock};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> huemon_core::Result<()> {
//! let api = Arc::new(HttpBridge::new("192.168.1.2", "app-key")?);
//! let aggregator = Arc::new(Aggregator::new(Bridge::new(), Arc::new(SystemClock), Arc::new(NullExport)));
//! let client = StreamClient::new(api, aggregator, Arc::new(LogNotifier));
//! client.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use huemon_types::{SampleValue, ServiceKind};

use crate::aggregator::Aggregator;
use crate::api::{BridgeApi, EventStream};
use crate::error::{Error, Result};
use crate::events::MonitorEvent;
use crate::notify::{MotionAlert, Notifier};
use crate::payload;
use crate::retry::{Backoff, RetryConfig};

/// Prefix of a data record in the event stream.
pub const RECORD_MARKER: &str = "data:";

/// Stream client settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// A connection that delivers nothing for this long is re-opened.
    pub idle_timeout: Duration,
    /// Delays between reconnects after failures.
    pub reconnect: RetryConfig,
    /// Upper bound for one notifier call.
    pub notify_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(86_400),
            reconnect: RetryConfig::for_reconnect(),
            notify_timeout: Duration::from_secs(10),
        }
    }
}

/// Splits a chunked byte stream into lines.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw = self.buf.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw[..pos]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left after the stream ended, if it is not blank.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buf.split();
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// One service update extracted from a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Id of the owning device (the sensor).
    pub owner: String,
    pub kind: ServiceKind,
    pub value: SampleValue,
    pub changed: Option<DateTime<Utc>>,
}

/// The updates in one record plus the number of items that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecord {
    pub updates: Vec<Update>,
    pub dropped: usize,
}

/// Decode one line of the event stream.
///
/// Returns `Ok(None)` for blank lines and lines without the record marker.
/// Envelopes other than `update` are ignored. Items without an owner, of an
/// untracked kind or without their value section are counted as dropped.
pub fn decode_record(line: &str) -> Result<Option<DecodedRecord>> {
    let Some(body) = line.trim().strip_prefix(RECORD_MARKER) else {
        return Ok(None);
    };
    let envelopes: Vec<Value> = serde_json::from_str(body.trim())
        .map_err(|e| Error::invalid_data(format!("record is not a JSON array: {}", e)))?;

    let mut decoded = DecodedRecord::default();
    for envelope in &envelopes {
        if envelope.get("type").and_then(Value::as_str) != Some("update") {
            continue;
        }
        let Some(items) = envelope.get("data").and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            match decode_item(item) {
                Some(update) => decoded.updates.push(update),
                None => decoded.dropped += 1,
            }
        }
    }
    Ok(Some(decoded))
}

fn decode_item(item: &Value) -> Option<Update> {
    let owner = item.pointer("/owner/rid")?.as_str()?;
    let kind = ServiceKind::from_rtype(item.get("type")?.as_str()?)?;
    let reading = payload::read_section(kind, item).ok()?;
    Some(Update {
        owner: owner.to_string(),
        kind,
        value: reading.value,
        changed: reading.changed,
    })
}

enum Disconnect {
    Cancelled,
    Idle,
    Closed { received: bool },
}

/// Long-running consumer of the bridge event stream.
pub struct StreamClient {
    api: Arc<dyn BridgeApi>,
    aggregator: Arc<Aggregator>,
    notifier: Arc<dyn Notifier>,
    config: StreamConfig,
}

impl StreamClient {
    pub fn new(
        api: Arc<dyn BridgeApi>,
        aggregator: Arc<Aggregator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            aggregator,
            notifier,
            config: StreamConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Consume the event stream until cancelled.
    ///
    /// Returns `Ok(())` on cancellation and `Err` only when the transport to
    /// the bridge is lost.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut backoff = Backoff::new(self.config.reconnect.clone());

        loop {
            let opened = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                opened = self.api.event_stream() => opened,
            };

            let result = match opened {
                Ok(stream) => {
                    debug!("Event stream connected");
                    self.consume(stream, &cancel).await
                }
                Err(e) => Err(e),
            };

            let delay = match result {
                Ok(Disconnect::Cancelled) => return Ok(()),
                Ok(Disconnect::Idle) => {
                    debug!(
                        "No events for {:?}, reconnecting",
                        self.config.idle_timeout
                    );
                    backoff.reset();
                    continue;
                }
                Ok(Disconnect::Closed { received: true }) => {
                    debug!("Event stream closed by bridge, reconnecting");
                    backoff.reset();
                    continue;
                }
                Ok(Disconnect::Closed { received: false }) => {
                    let delay = backoff.next_delay();
                    warn!("Event stream closed without data, retrying in {:?}", delay);
                    delay
                }
                Err(e) if e.is_transport() => {
                    error!("Event stream lost: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        "Event stream error (attempt {}): {}, retrying in {:?}",
                        backoff.attempts(),
                        e,
                        delay
                    );
                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn consume(&self, mut stream: EventStream, cancel: &CancellationToken) -> Result<Disconnect> {
        let mut decoder = FrameDecoder::new();
        let mut received = false;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(Disconnect::Cancelled),
                next = tokio::time::timeout(self.config.idle_timeout, stream.next()) => next,
            };

            match next {
                Err(_) => return Ok(Disconnect::Idle),
                Ok(None) => {
                    if let Some(line) = decoder.finish() {
                        self.handle_line(&line).await;
                    }
                    return Ok(Disconnect::Closed { received });
                }
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(chunk))) => {
                    received = true;
                    for line in decoder.push(&chunk) {
                        self.handle_line(&line).await;
                    }
                }
            }
        }
    }

    /// Process one line of the event stream.
    pub async fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        if self.aggregator.rollover(false).await {
            self.aggregator.after_rollover(self.api.as_ref()).await;
        }

        let decoded = match decode_record(line) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return,
            Err(e) => {
                debug!("Skipping record: {}", e);
                self.aggregator.note_skipped();
                return;
            }
        };
        for _ in 0..decoded.dropped {
            self.aggregator.note_skipped();
        }
        for update in decoded.updates {
            self.dispatch(update).await;
        }
    }

    async fn dispatch(&self, update: Update) {
        let clock = self.aggregator.clock();
        let timestamp = update
            .changed
            .map(|utc| clock.to_local(utc))
            .unwrap_or_else(|| clock.now());

        let outcome = self
            .aggregator
            .apply(&update.owner, update.kind, timestamp, update.value)
            .await;

        if outcome.is_stored()
            && update.kind == ServiceKind::Motion
            && update.value.is_active()
            && let Some(alert) = self.aggregator.alert_for(&update.owner, timestamp).await
        {
            self.send_alert(alert);
        }
    }

    fn send_alert(&self, alert: MotionAlert) {
        info!("Motion alert: {}", alert.message);
        self.aggregator.events().send(MonitorEvent::MotionAlert {
            sensor_id: alert.sensor_id.clone(),
            timestamp: alert.timestamp,
        });

        let notifier = Arc::clone(&self.notifier);
        let limit = self.config.notify_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(limit, notifier.notify(&alert)).await {
                Ok(Ok(())) => debug!("Alert for {} delivered", alert.sensor_name),
                Ok(Err(e)) => warn!("Alert for {} not delivered: {}", alert.sensor_name, e),
                Err(_) => warn!("Alert for {} timed out after {:?}", alert.sensor_name, limit),
            }
        });
    }
}
