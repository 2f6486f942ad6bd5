//! Long-running monitor for Hue bridge motion sensors.
//!
//! This crate provides the `huemon` service that:
//! - Discovers the motion sensors paired with a bridge
//! - Keeps the bridge's event stream open and records every change
//! - Sends motion alerts outside per-sensor quiet periods
//! - Disables sensor capabilities on the bridge during quiet periods
//! - Writes one CSV file per sensor and day
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/huemon/huemon.toml`:
//!
//! ```toml
//! [bridge]
//! address = "192.168.1.2"
//! app_key = "obtained-with-huemon-pair"
//!
//! [policy]
//! tick_interval_secs = 60
//!
//! [export]
//! directory = "/var/lib/huemon"
//!
//! [notifications]
//! webhook_url = "https://hooks.example.org/motion"
//!
//! [[sensors]]
//! name = "Hall"
//! notify = true
//! quiet_times = "22:00-23:00, 06:00-07:00"
//! suspend = true
//! ```
//!
//! # Exit status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Clean shutdown (SIGINT/SIGTERM) |
//! | 1 | Connection to the bridge lost |
//! | 2 | Configuration, authentication or discovery failure |

pub mod app;
pub mod config;
pub mod csv_export;
pub mod webhook;

pub use app::{ExitStatus, Monitor};
pub use config::{Config, ConfigError, ValidationError};
pub use csv_export::CsvExport;
pub use webhook::WebhookNotifier;
