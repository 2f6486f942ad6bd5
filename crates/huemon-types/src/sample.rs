//! Time-series samples.

use core::fmt;

use chrono::NaiveDateTime;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single measured value.
///
/// `Null` records that the bridge reported the event without a value; it is
/// stored like any other sample so a sensor going quiet stays observable.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SampleValue {
    /// Boolean state (motion).
    Bool(bool),
    /// Numeric measurement (battery %, light level, temperature).
    Number(f64),
    /// No value was reported.
    Null,
}

impl SampleValue {
    /// True only for `Bool(true)`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    /// Numeric view of the value, if any.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{:.2}", n),
            Self::Null => f.write_str("-"),
        }
    }
}

impl From<bool> for SampleValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// A timestamped value in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// When the bridge observed the change (local time).
    pub timestamp: NaiveDateTime,
    /// The observed value.
    pub value: SampleValue,
}

impl Sample {
    /// Create a new sample.
    pub fn new(timestamp: NaiveDateTime, value: impl Into<SampleValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_integers_without_fraction() {
        assert_eq!(SampleValue::Number(87.0).to_string(), "87");
        assert_eq!(SampleValue::Number(21.456).to_string(), "21.46");
        assert_eq!(SampleValue::Bool(true).to_string(), "true");
        assert_eq!(SampleValue::Null.to_string(), "-");
    }

    #[test]
    fn test_is_active() {
        assert!(SampleValue::Bool(true).is_active());
        assert!(!SampleValue::Bool(false).is_active());
        assert!(!SampleValue::Number(1.0).is_active());
        assert!(!SampleValue::Null.is_active());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_untagged_serde() {
        let values: Vec<SampleValue> = serde_json::from_str("[true, 12.5, null]").unwrap();
        assert_eq!(
            values,
            vec![
                SampleValue::Bool(true),
                SampleValue::Number(12.5),
                SampleValue::Null
            ]
        );
    }
}
