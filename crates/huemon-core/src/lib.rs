//! Event-stream client and daily aggregation engine for Hue bridge sensors.
//!
//! This crate watches the motion sensors paired with a Hue bridge: it keeps
//! the bridge's event stream open, buffers each sensor's measurements for the
//! current day, and applies per-sensor quiet periods.
//!
//! # Features
//!
//! - **Resilient event stream**: idle reconnects, backoff on transient
//!   failures, fatal only on transport loss
//! - **Daily aggregation**: ordered per-service series, 96-bucket motion
//!   profile, exactly-once day rollover with export hand-off
//! - **Quiet periods**: motion alerts are suppressed and suspendable
//!   capabilities are disabled on the bridge while a period is active
//! - **Pairing**: bounded link-button pairing with observable progress
//! - **Testability**: [`MockBridge`] and [`ManualClock`] drive everything
//!   without a bridge or a real midnight
//!
//! # Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`Bridge`] / [`Sensor`] / [`Service`] | Entity model |
//! | [`Aggregator`] | Owns the model; apply, rollover, profile |
//! | [`StreamClient`] | Consumes the event stream |
//! | [`PolicyEngine`] | Periodic quiet-period enforcement |
//! | [`ExportSink`] / [`Notifier`] | Collaborators implemented by the service |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use huemon_core::{
//!     Aggregator, Bridge, HttpBridge, LogNotifier, NullExport, PolicyEngine, StreamClient,
//!     SystemClock, DEFAULT_PRODUCT_NAME,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = Arc::new(HttpBridge::new("192.168.1.2", "app-key")?);
//!     let clock = Arc::new(SystemClock);
//!     let bridge = Bridge::discover(api.as_ref(), clock.as_ref(), DEFAULT_PRODUCT_NAME, &()).await?;
//!
//!     let aggregator = Arc::new(Aggregator::new(bridge, clock, Arc::new(NullExport)));
//!     let policy = PolicyEngine::new(api.clone(), aggregator.clone());
//!     let stream = StreamClient::new(api, aggregator, Arc::new(LogNotifier));
//!
//!     let cancel = CancellationToken::new();
//!     let (result, ()) = tokio::join!(stream.run(cancel.clone()), policy.run(cancel.clone()));
//!     result?;
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod api;
pub mod clock;
pub mod error;
pub mod events;
pub mod export;
pub mod http;
pub mod mock;
pub mod model;
pub mod notify;
pub mod pairing;
pub mod payload;
pub mod policy;
pub mod retry;
pub mod stream;

pub use aggregator::{Aggregator, AggregatorStats, ApplyOutcome, Discovery};
pub use api::{BridgeApi, DeviceRecord, EventStream, ServiceRef};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, MonitorEvent};
pub use export::{DaySnapshot, ExportReason, ExportSink, NullExport, SensorSnapshot, ServiceSnapshot};
pub use http::{HttpBridge, HttpPairing};
pub use mock::{ConnectionEnd, MockBridge, RecordingExport, RecordingNotifier, ScriptedConnection};
pub use model::{
    BRIDGE_PRODUCT_NAME, Bridge, DEFAULT_PRODUCT_NAME, EnabledState, PolicySource, QuietSchedule,
    Sensor, Service,
};
pub use notify::{LogNotifier, MotionAlert, Notifier};
pub use pairing::{Credentials, Pairing, PairingApi, PairingConfig, PairingStatus};
pub use policy::{PolicyConfig, PolicyEngine, TickReport};
pub use retry::{Backoff, RetryConfig, with_retry};
pub use stream::{StreamClient, StreamConfig};

// Re-export the shared types
pub use huemon_types::{
    IntervalSpec, MotionProfile, PolicySettings, Sample, SampleValue, ServiceKind, in_interval,
};
