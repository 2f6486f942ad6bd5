//! Wiring of the monitor: discovery, the two long-running tasks, shutdown.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use huemon_core::{
    Aggregator, Bridge, BridgeApi, Clock, Credentials, Discovery, ExportSink, HttpBridge,
    HttpPairing, LogNotifier, MonitorEvent, Notifier, NullExport, Pairing, PairingConfig,
    PairingStatus, PolicyConfig, PolicyEngine, PolicySource, RetryConfig, StreamClient,
    StreamConfig, SystemClock, with_retry,
};

use crate::config::Config;
use crate::csv_export::CsvExport;
use crate::webhook::WebhookNotifier;

/// How the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Shutdown was requested and the day was flushed.
    Clean,
    /// The connection to the bridge was lost.
    StreamFailure,
    /// Configuration, authentication or discovery failed.
    Setup,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::StreamFailure => 1,
            Self::Setup => 2,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// A discovered, ready-to-run monitor.
pub struct Monitor {
    aggregator: Arc<Aggregator>,
    stream: StreamClient,
    policy: PolicyEngine,
}

impl Monitor {
    /// Discover the sensors behind `api` and assemble the engine.
    pub async fn build(
        api: Arc<dyn BridgeApi>,
        clock: Arc<dyn Clock>,
        config: &Config,
        exporter: Arc<dyn ExportSink>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let policies: Arc<dyn PolicySource> = Arc::new(config.policies());
        let product_name = config.bridge.product_name.clone();

        let bridge = {
            let (api, clock, policies) = (api.as_ref(), clock.as_ref(), policies.as_ref());
            let product_name = product_name.as_str();
            with_retry(&RetryConfig::for_request(), "discover sensors", || {
                Bridge::discover(api, clock, product_name, policies)
            })
            .await
            .context("sensor discovery failed")?
        };

        if bridge.is_empty() {
            warn!("No devices named '{}' found on the bridge", product_name);
        }
        info!(
            "Monitoring {} sensor(s) on {}",
            bridge.len(),
            bridge.name().unwrap_or("bridge")
        );
        for line in bridge.status_lines() {
            info!("{}", line);
        }

        let aggregator = Arc::new(Aggregator::new(bridge, clock, exporter).with_discovery(
            Discovery {
                product_name,
                policies,
            },
        ));
        let stream = StreamClient::new(api.clone(), aggregator.clone(), notifier).with_config(
            StreamConfig {
                idle_timeout: config.bridge.idle_timeout(),
                ..Default::default()
            },
        );
        let policy = PolicyEngine::new(api, aggregator.clone()).with_config(PolicyConfig {
            tick_interval: config.policy.tick_interval(),
            call_timeout: config.bridge.request_timeout(),
        });

        Ok(Self {
            aggregator,
            stream,
            policy,
        })
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Run until `cancel` fires or the stream fails, then flush the day.
    pub async fn run(self, cancel: CancellationToken) -> ExitStatus {
        let events = spawn_event_log(&self.aggregator, cancel.clone());

        let policy = Arc::new(self.policy);
        let policy_task = {
            let (policy, cancel) = (policy.clone(), cancel.clone());
            tokio::spawn(async move { policy.run(cancel).await })
        };

        let status = match self.stream.run(cancel.clone()).await {
            Ok(()) => {
                info!("Shutting down");
                ExitStatus::Clean
            }
            Err(e) => {
                error!("Event stream failed: {}", e);
                ExitStatus::StreamFailure
            }
        };

        cancel.cancel();
        if let Err(e) = policy_task.await {
            warn!("Policy task ended abnormally: {}", e);
        }
        // best effort; a killed process loses the unflushed day
        if let Err(e) = self.aggregator.flush().await {
            warn!("Final export failed: {}", e);
        }
        events.abort();

        let stats = self.aggregator.stats();
        info!(
            "Stored {} samples, rejected {}, skipped {} records, {} rollover(s)",
            stats.stored, stats.rejected, stats.skipped, stats.rollovers
        );
        status
    }
}

fn spawn_event_log(
    aggregator: &Aggregator,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = aggregator.events().subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(MonitorEvent::SampleRejected {
                    sensor_id,
                    kind,
                    timestamp,
                }) => debug!("Out-of-order {} sample from {} at {}", kind, sensor_id, timestamp),
                Ok(MonitorEvent::RolledOver { day }) => debug!("Day {} handed off", day),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Event log lagged by {} events", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn exporter(config: &Config) -> Arc<dyn ExportSink> {
    if config.export.enabled {
        info!("Exporting daily CSV files to {}", config.export.directory.display());
        Arc::new(CsvExport::new(config.export.directory.clone()))
    } else {
        Arc::new(NullExport)
    }
}

fn notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.notifications.webhook_url {
        Some(url) => {
            info!("Delivering motion alerts to {}", url);
            Ok(Arc::new(WebhookNotifier::new(
                url.clone(),
                config.notifications.timeout(),
            )?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        cancel.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Run the monitor against the configured bridge.
pub async fn run(config: Config) -> ExitStatus {
    let monitor = match setup(&config).await {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("{:#}", e);
            return ExitStatus::Setup;
        }
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    monitor.run(cancel).await
}

/// Checks that must pass before the bridge is contacted. Returns the key.
fn preflight(config: &Config) -> anyhow::Result<&str> {
    config.validate()?;
    for warning in config.warnings() {
        warn!("{}", warning);
    }
    match config.bridge.app_key.as_deref() {
        Some(app_key) => Ok(app_key),
        None => bail!("no application key configured; run `huemon pair` first"),
    }
}

async fn setup(config: &Config) -> anyhow::Result<Monitor> {
    let app_key = preflight(config)?;

    let api = Arc::new(HttpBridge::with_timeout(
        &config.bridge.address,
        app_key,
        config.bridge.request_timeout(),
    )?);
    info!("Connecting to bridge at {}", api.base_url());

    Monitor::build(
        api,
        Arc::new(SystemClock),
        config,
        exporter(config),
        notifier(config)?,
    )
    .await
}

/// Pair with the bridge; the user presses the link button meanwhile.
pub async fn pair(config: &Config) -> anyhow::Result<Credentials> {
    if config.bridge.address.trim().is_empty() {
        bail!("bridge address is not configured");
    }
    let api = Arc::new(HttpPairing::new(
        &config.bridge.address,
        config.bridge.request_timeout(),
    )?);
    let pairing = Pairing::new(
        api,
        PairingConfig {
            max_attempts: config.bridge.pairing_attempts,
            interval: std::time::Duration::from_secs(config.bridge.pairing_interval_secs),
            ..Default::default()
        },
    );

    let mut status = pairing.subscribe();
    let printer = tokio::spawn(async move {
        let mut prompted = false;
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match current {
                PairingStatus::AwaitingButton { attempt, max } => {
                    if !prompted {
                        println!("Press the link button on the bridge...");
                        prompted = true;
                    }
                    debug!("Waiting for link button ({}/{})", attempt, max);
                }
                PairingStatus::Paired => println!("Paired."),
                PairingStatus::Failed(reason) => println!("Pairing failed: {}", reason),
                PairingStatus::Idle | PairingStatus::Requesting { .. } => {}
            }
            if status.borrow().is_finished() {
                break;
            }
        }
    });

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    let result = pairing.run(cancel).await;
    let _ = printer.await;
    Ok(result?)
}
