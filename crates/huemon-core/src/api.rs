//! Bridge remote API abstraction.
//!
//! [`BridgeApi`] is the seam between the engine and the bridge: the real
//! implementation is [`crate::HttpBridge`], tests use [`crate::MockBridge`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use huemon_types::ServiceKind;

/// A chunked byte stream from the bridge's event endpoint.
///
/// Chunk boundaries carry no meaning; frames are newline-delimited.
pub type EventStream = BoxStream<'static, Result<Bytes>>;

/// A device as listed by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable device id.
    pub id: String,
    /// User-assigned display name.
    pub name: String,
    /// Product name, e.g. "Hue motion sensor".
    pub product_name: String,
}

/// A service reference inside a device record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    /// Service resource id.
    pub id: String,
    /// Resource type, e.g. `motion` or `zigbee_connectivity`.
    pub rtype: String,
}

impl ServiceRef {
    /// The capability kind, if this is a capability the monitor tracks.
    pub fn kind(&self) -> Option<ServiceKind> {
        ServiceKind::from_rtype(&self.rtype)
    }
}

/// Operations the monitor needs from the bridge.
///
/// All calls except [`event_stream`](Self::event_stream) are short and must
/// be bounded by a timeout in the implementation.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// `GET devices`.
    async fn devices(&self) -> Result<Vec<DeviceRecord>>;

    /// `GET device/{id}`: the device's service references.
    async fn device_services(&self, device_id: &str) -> Result<Vec<ServiceRef>>;

    /// `GET service/{kind}/{id}`: the service's current resource object.
    async fn service_state(&self, kind: ServiceKind, service_id: &str)
    -> Result<serde_json::Value>;

    /// `PUT service/{kind}/{id} {enabled}`.
    async fn set_enabled(&self, kind: ServiceKind, service_id: &str, enabled: bool) -> Result<()>;

    /// `GET eventstream`: open one long-lived streaming connection.
    async fn event_stream(&self) -> Result<EventStream>;
}
