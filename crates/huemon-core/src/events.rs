//! Monitor event system.
//!
//! The aggregator and policy engine publish what they do on a broadcast
//! channel so the service (or a test) can observe stored samples, rollovers
//! and enable/disable transitions without reaching into the entity model.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use huemon_types::{SampleValue, ServiceKind};

/// Events emitted by the monitoring engine.
///
/// Non-exhaustive: match with a wildcard arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum MonitorEvent {
    /// A sample was appended to a service's series.
    SampleStored {
        sensor_id: String,
        kind: ServiceKind,
        timestamp: NaiveDateTime,
        value: SampleValue,
    },
    /// A sample was not newer than the last stored one.
    SampleRejected {
        sensor_id: String,
        kind: ServiceKind,
        timestamp: NaiveDateTime,
    },
    /// The day rolled over; `day` is the day that just ended.
    RolledOver { day: NaiveDate },
    /// A capability was disabled on the bridge for a quiet period.
    ServiceSuspended { sensor_id: String, kind: ServiceKind },
    /// A capability was re-enabled after a quiet period.
    ServiceResumed { sensor_id: String, kind: ServiceKind },
    /// Motion was observed outside any quiet period on a notifying sensor.
    MotionAlert {
        sensor_id: String,
        timestamp: NaiveDateTime,
    },
}

/// Sender for monitor events.
pub type EventSender = broadcast::Sender<MonitorEvent>;

/// Receiver for monitor events.
pub type EventReceiver = broadcast::Receiver<MonitorEvent>;

/// Fan-out of [`MonitorEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// `capacity` events are buffered per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Publish `event`; dropped silently when nobody listens.
    pub fn send(&self, event: MonitorEvent) {
        let _ = self.sender.send(event);
    }

    /// Live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
