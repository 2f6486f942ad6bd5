//! Mock bridge implementation for testing.
//!
//! [`MockBridge`] implements [`BridgeApi`] from scripted data so the stream
//! client and policy engine can be exercised without a bridge on the network.
//!
//! # Features
//!
//! - **Scripted connections**: each call to `event_stream` consumes the next
//!   [`ScriptedConnection`], which yields its chunks and then idles, closes
//!   or fails. When the script runs out the mock reports a lost connection.
//! - **Failure injection**: make `set_enabled` fail or hang.
//! - **Call log**: every successful enable/disable call is recorded.
//!
//! [`RecordingExport`] and [`RecordingNotifier`] capture what the engine
//! hands to its collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};

use huemon_types::ServiceKind;

use crate::api::{BridgeApi, DeviceRecord, EventStream, ServiceRef};
use crate::error::{Error, Result};
use crate::export::{DaySnapshot, ExportSink};
use crate::model::DEFAULT_PRODUCT_NAME;
use crate::notify::{MotionAlert, Notifier};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How a scripted connection behaves after its last chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Stay open without sending anything.
    Idle,
    /// The server closes the stream.
    Close,
    /// A transient read error.
    Transient(String),
    /// The transport is lost.
    Lost(String),
}

/// One scripted event-stream connection.
#[derive(Debug, Clone)]
pub struct ScriptedConnection {
    chunks: Vec<Bytes>,
    end: ConnectionEnd,
    open_error: Option<u16>,
}

impl ScriptedConnection {
    pub fn new(end: ConnectionEnd) -> Self {
        Self {
            chunks: Vec::new(),
            end,
            open_error: None,
        }
    }

    /// A connection that is refused with this HTTP status.
    pub fn unavailable(status: u16) -> Self {
        Self {
            chunks: Vec::new(),
            end: ConnectionEnd::Close,
            open_error: Some(status),
        }
    }

    /// Append a raw chunk.
    #[must_use]
    pub fn chunk(mut self, data: impl Into<Bytes>) -> Self {
        self.chunks.push(data.into());
        self
    }

    fn into_stream(self) -> EventStream {
        let chunks = stream::iter(self.chunks.into_iter().map(Ok));
        match self.end {
            ConnectionEnd::Idle => chunks.chain(stream::pending()).boxed(),
            ConnectionEnd::Close => chunks.boxed(),
            ConnectionEnd::Transient(message) => chunks
                .chain(stream::once(async move { Err(Error::Request(message)) }))
                .boxed(),
            ConnectionEnd::Lost(message) => chunks
                .chain(stream::once(async move { Err(Error::ConnectionFailed(message)) }))
                .boxed(),
        }
    }
}

/// Render one `data:` record holding a single update for `service_id`.
///
/// `value` becomes the kind's value field inside its report object.
pub fn update_record(
    owner: &str,
    kind: ServiceKind,
    service_id: &str,
    value: Value,
    changed: Option<DateTime<Utc>>,
) -> String {
    let mut report = json!({ kind.value_field(): value });
    if let Some(changed) = changed {
        report["changed"] = json!(changed.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string());
    }
    let item = json!({
        "id": service_id,
        "type": kind.rtype(),
        "owner": {"rid": owner, "rtype": "device"},
        kind.section(): { kind.report_field(): report },
    });
    let envelope = json!([{
        "creationtime": "2026-10-18T00:00:00Z",
        "id": "00000000-0000-0000-0000-000000000000",
        "type": "update",
        "data": [item],
    }]);
    format!("data: {}\n\n", envelope)
}

/// A mock Hue bridge.
pub struct MockBridge {
    devices: Mutex<Vec<DeviceRecord>>,
    services: Mutex<HashMap<String, Vec<ServiceRef>>>,
    states: Mutex<HashMap<String, Value>>,
    connections: Mutex<VecDeque<ScriptedConnection>>,
    enabled_calls: Mutex<Vec<(ServiceKind, String, bool)>>,
    connect_count: AtomicU32,
    fail_set_enabled: AtomicBool,
    /// Simulated `set_enabled` latency in milliseconds (0 = no delay).
    set_enabled_latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBridge")
            .field("devices", &lock(&self.devices).len())
            .field("connect_count", &self.connect_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBridge {
    /// An empty bridge with only its own device record.
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(vec![DeviceRecord {
                id: "bridge-device".into(),
                name: "Mock Bridge".into(),
                product_name: crate::model::BRIDGE_PRODUCT_NAME.into(),
            }]),
            services: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            connections: Mutex::new(VecDeque::new()),
            enabled_calls: Mutex::new(Vec::new()),
            connect_count: AtomicU32::new(0),
            fail_set_enabled: AtomicBool::new(false),
            set_enabled_latency_ms: AtomicU64::new(0),
        }
    }

    /// Add a device with the given services.
    #[must_use]
    pub fn with_device(self, device: DeviceRecord, services: Vec<ServiceRef>) -> Self {
        lock(&self.services).insert(device.id.clone(), services);
        lock(&self.devices).push(device);
        self
    }

    /// Add a motion sensor with all four capabilities.
    ///
    /// Service ids are `<id>-<rtype>`; suspendable services start enabled.
    #[must_use]
    pub fn with_motion_sensor(self, id: &str, name: &str) -> Self {
        let services = ServiceKind::ALL
            .iter()
            .map(|kind| ServiceRef {
                id: Self::service_id(id, *kind),
                rtype: kind.rtype().to_string(),
            })
            .collect();
        for kind in ServiceKind::ALL {
            let mut state = json!({
                "id": Self::service_id(id, kind),
                "type": kind.rtype(),
                "owner": {"rid": id, "rtype": "device"},
                kind.section(): {},
            });
            if kind.is_suspendable() {
                state["enabled"] = json!(true);
            }
            lock(&self.states).insert(Self::service_id(id, kind), state);
        }
        self.with_device(
            DeviceRecord {
                id: id.to_string(),
                name: name.to_string(),
                product_name: DEFAULT_PRODUCT_NAME.to_string(),
            },
            services,
        )
    }

    /// The service id [`with_motion_sensor`](Self::with_motion_sensor) assigns.
    pub fn service_id(device_id: &str, kind: ServiceKind) -> String {
        format!("{}-{}", device_id, kind.rtype())
    }

    /// Set the resource object returned for a service.
    #[must_use]
    pub fn with_state(self, service_id: &str, state: Value) -> Self {
        self.set_state(service_id, state);
        self
    }

    pub fn set_state(&self, service_id: &str, state: Value) {
        lock(&self.states).insert(service_id.to_string(), state);
    }

    /// Queue a scripted event-stream connection.
    #[must_use]
    pub fn with_connection(self, connection: ScriptedConnection) -> Self {
        self.push_connection(connection);
        self
    }

    pub fn push_connection(&self, connection: ScriptedConnection) {
        lock(&self.connections).push_back(connection);
    }

    /// Remove a device, as if it had been unpaired.
    pub fn remove_device(&self, id: &str) {
        lock(&self.devices).retain(|d| d.id != id);
        lock(&self.services).remove(id);
    }

    pub fn set_fail_set_enabled(&self, fail: bool) {
        self.fail_set_enabled.store(fail, Ordering::Relaxed);
    }

    /// Delay every `set_enabled` call.
    pub fn set_enabled_latency(&self, latency: Duration) {
        self.set_enabled_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Successful enable/disable calls, in order.
    pub fn enabled_calls(&self) -> Vec<(ServiceKind, String, bool)> {
        lock(&self.enabled_calls).clone()
    }

    /// Number of `event_stream` calls so far.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BridgeApi for MockBridge {
    async fn devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(lock(&self.devices).clone())
    }

    async fn device_services(&self, device_id: &str) -> Result<Vec<ServiceRef>> {
        lock(&self.services)
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(device_id.to_string()))
    }

    async fn service_state(&self, _kind: ServiceKind, service_id: &str) -> Result<Value> {
        lock(&self.states)
            .get(service_id)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(service_id.to_string()))
    }

    async fn set_enabled(&self, kind: ServiceKind, service_id: &str, enabled: bool) -> Result<()> {
        let latency = self.set_enabled_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_set_enabled.load(Ordering::Relaxed) {
            return Err(Error::Status {
                status: 503,
                url: format!("mock://resource/{}/{}", kind.rtype(), service_id),
            });
        }
        if let Some(state) = lock(&self.states).get_mut(service_id) {
            state["enabled"] = json!(enabled);
        }
        lock(&self.enabled_calls).push((kind, service_id.to_string(), enabled));
        Ok(())
    }

    async fn event_stream(&self) -> Result<EventStream> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
        let next = lock(&self.connections).pop_front();
        match next {
            Some(connection) => match connection.open_error {
                Some(status) => Err(Error::Status {
                    status,
                    url: "mock://eventstream".into(),
                }),
                None => Ok(connection.into_stream()),
            },
            None => Err(Error::ConnectionFailed("mock bridge went away".into())),
        }
    }
}

/// Export sink that keeps every snapshot.
#[derive(Debug, Default)]
pub struct RecordingExport {
    snapshots: Mutex<Vec<DaySnapshot>>,
    fail: bool,
}

impl RecordingExport {
    /// A sink whose exports always fail (nothing is recorded).
    pub fn failing() -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn snapshots(&self) -> Vec<DaySnapshot> {
        lock(&self.snapshots).clone()
    }
}

#[async_trait]
impl ExportSink for RecordingExport {
    async fn export(&self, snapshot: &DaySnapshot) -> Result<()> {
        if self.fail {
            return Err(Error::Export("mock export failure".into()));
        }
        lock(&self.snapshots).push(snapshot.clone());
        Ok(())
    }
}

/// Notifier that keeps every alert.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<MotionAlert>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<MotionAlert> {
        lock(&self.alerts).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &MotionAlert) -> Result<()> {
        lock(&self.alerts).push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_motion_sensor_topology() {
        let bridge = MockBridge::new().with_motion_sensor("d1", "Hall");
        let devices = bridge.devices().await.unwrap();
        assert_eq!(devices.len(), 2);

        let services = bridge.device_services("d1").await.unwrap();
        assert_eq!(services.len(), 4);

        let motion = bridge
            .service_state(ServiceKind::Motion, "d1-motion")
            .await
            .unwrap();
        assert_eq!(motion["enabled"], json!(true));
        let power = bridge
            .service_state(ServiceKind::Power, "d1-device_power")
            .await
            .unwrap();
        assert!(power.get("enabled").is_none());
    }

    #[tokio::test]
    async fn test_scripted_connections_then_lost() {
        let bridge = MockBridge::new()
            .with_connection(ScriptedConnection::new(ConnectionEnd::Close).chunk("data: []\n"));

        let mut stream = bridge.event_stream().await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("data: []\n"));
        assert!(stream.next().await.is_none());

        assert!(matches!(bridge.event_stream().await, Err(e) if e.is_transport()));
        assert_eq!(bridge.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_set_enabled_failure_injection() {
        let bridge = MockBridge::new().with_motion_sensor("d1", "Hall");
        bridge.set_fail_set_enabled(true);
        assert!(bridge.set_enabled(ServiceKind::Motion, "d1-motion", false).await.is_err());
        assert!(bridge.enabled_calls().is_empty());

        bridge.set_fail_set_enabled(false);
        bridge.set_enabled(ServiceKind::Motion, "d1-motion", false).await.unwrap();
        assert_eq!(
            bridge.enabled_calls(),
            vec![(ServiceKind::Motion, "d1-motion".to_string(), false)]
        );
    }

    #[test]
    fn test_update_record_shape() {
        let record = update_record("d1", ServiceKind::Temperature, "d1-temperature", json!(21.5), None);
        assert!(record.starts_with("data: "));
        let body: Value = serde_json::from_str(record.trim_start_matches("data:").trim()).unwrap();
        assert_eq!(body[0]["type"], "update");
        assert_eq!(body[0]["data"][0]["owner"]["rid"], "d1");
        assert_eq!(
            body[0]["data"][0]["temperature"]["temperature_report"]["temperature"],
            json!(21.5)
        );
    }
}
