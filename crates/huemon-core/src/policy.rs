//! Quiet-period policy engine.
//!
//! Runs on its own periodic tick alongside the stream client. For every
//! sensor with `suspend` set it disables the suspendable services while a
//! quiet period is active and re-enables them afterwards. Each remote call
//! is bounded by a timeout; a failed call leaves the stored state unchanged
//! so the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use huemon_types::ServiceKind;

use crate::aggregator::Aggregator;
use crate::api::BridgeApi;
use crate::events::MonitorEvent;
use crate::model::{Bridge, EnabledState};

/// Policy engine settings.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Time between ticks.
    pub tick_interval: Duration,
    /// Upper bound for one enable/disable call.
    pub call_timeout: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            call_timeout: Duration::from_secs(3),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rolled_over: bool,
    pub suspended: usize,
    pub resumed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct Transition {
    sensor_id: String,
    sensor_name: String,
    kind: ServiceKind,
    service_id: String,
    enable: bool,
}

fn plan(bridge: &Bridge, now: NaiveDateTime) -> Vec<Transition> {
    let mut transitions = Vec::new();
    for sensor in bridge.sensors().iter().filter(|s| s.settings().suspend) {
        let quiet = sensor.is_quiet(now);
        for service in sensor.services() {
            let enable = match (quiet, service.enabled()) {
                (true, EnabledState::Enabled) => false,
                (false, EnabledState::Disabled) => true,
                _ => continue,
            };
            transitions.push(Transition {
                sensor_id: sensor.id().to_string(),
                sensor_name: sensor.name().to_string(),
                kind: service.kind(),
                service_id: service.id().to_string(),
                enable,
            });
        }
    }
    transitions
}

pub struct PolicyEngine {
    api: Arc<dyn BridgeApi>,
    aggregator: Arc<Aggregator>,
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(api: Arc<dyn BridgeApi>, aggregator: Arc<Aggregator>) -> Self {
        Self {
            api,
            aggregator,
            config: PolicyConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PolicyConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one evaluation: rollover check, then enable/disable transitions.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        if self.aggregator.rollover(false).await {
            report.rolled_over = true;
            self.aggregator.after_rollover(self.api.as_ref()).await;
        }

        let now = self.aggregator.clock().now();
        let transitions = self.aggregator.read(|bridge| plan(bridge, now)).await;

        for t in transitions {
            let action = if t.enable { "enable" } else { "disable" };
            let call = tokio::time::timeout(
                self.config.call_timeout,
                self.api.set_enabled(t.kind, &t.service_id, t.enable),
            )
            .await;

            match call {
                Ok(Ok(())) => {
                    let state = EnabledState::from_bool(t.enable);
                    if !self.aggregator.set_enabled(&t.sensor_id, t.kind, state).await {
                        continue;
                    }
                    let event = if t.enable {
                        report.resumed += 1;
                        info!("{}: {} resumed", t.sensor_name, t.kind.description());
                        MonitorEvent::ServiceResumed {
                            sensor_id: t.sensor_id,
                            kind: t.kind,
                        }
                    } else {
                        report.suspended += 1;
                        info!("{}: {} suspended", t.sensor_name, t.kind.description());
                        MonitorEvent::ServiceSuspended {
                            sensor_id: t.sensor_id,
                            kind: t.kind,
                        }
                    };
                    self.aggregator.events().send(event);
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!("{}: failed to {} {}: {}", t.sensor_name, action, t.kind, e);
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        "{}: {} {} timed out after {:?}",
                        t.sensor_name, action, t.kind, self.config.call_timeout
                    );
                }
            }
        }

        report
    }

    /// Tick until cancelled. The first tick runs immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Policy engine stopped");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report != TickReport::default() {
                        debug!("Policy tick: {:?}", report);
                    }
                }
            }
        }
    }
}
