//! Error types for parsing in huemon-types.

use thiserror::Error;

/// Errors that can occur when parsing sensor data or interval specifications.
///
/// This error type is platform-agnostic and does not include
/// network errors (those belong in huemon-core).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// An interval list or bound could not be parsed.
    #[error("Invalid interval '{spec}': {reason}")]
    InvalidInterval {
        /// The offending text.
        spec: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A capability name did not match any known service kind.
    #[error("Unknown service kind: {0}")]
    UnknownServiceKind(String),

    /// Generic invalid data.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl ParseError {
    pub(crate) fn interval(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            spec: spec.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using huemon-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
