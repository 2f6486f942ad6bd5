//! Platform-agnostic types for Hue bridge sensor monitoring.
//!
//! This crate holds the I/O-free building blocks shared by the monitoring
//! engine (`huemon-core`) and the service binary:
//!
//! - [`ServiceKind`]: the closed set of sensor capabilities and where their
//!   values live in bridge payloads
//! - [`Sample`] / [`SampleValue`]: timestamped measurements
//! - [`MotionProfile`]: the 96-bucket daily occupancy summary
//! - [`in_interval`] / [`IntervalSpec`]: quiet-period evaluation
//! - [`PolicySettings`]: per-sensor alerting and suspension policy
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use huemon_types::{MotionProfile, Sample, in_interval};
//!
//! let ts = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap().and_hms_opt(22, 30, 0).unwrap();
//! assert!(in_interval(ts, "22:00-23:00", true));
//!
//! let profile = MotionProfile::from_samples(&[Sample::new(ts, true)]);
//! assert!(profile.is_occupied(90));
//! ```

pub mod error;
pub mod interval;
pub mod kind;
pub mod profile;
pub mod sample;
pub mod settings;

pub use error::{ParseError, ParseResult};
pub use interval::{IntervalKind, IntervalSpec, in_interval};
pub use kind::ServiceKind;
pub use profile::{BUCKETS_PER_DAY, MotionProfile};
pub use sample::{Sample, SampleValue};
pub use settings::PolicySettings;
