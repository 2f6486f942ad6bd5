//! Error types for huemon-core.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::ConnectionFailed`] | Propagate | Transport lost; the caller owns restart policy |
//! | [`Error::Timeout`] | Reconnect / next tick | Idle stream or slow bridge call |
//! | [`Error::Request`] | Log, reconnect with backoff | Transient HTTP failure |
//! | [`Error::Status`] | Log, reconnect with backoff | Bridge busy or rate limiting |
//! | [`Error::InvalidData`] | Skip the record | Malformed frame or payload |
//! | [`Error::UnknownEntity`] | Skip the record | Topology changed since last resync |
//! | [`Error::Api`] | Do not retry | Bridge rejected the request |
//! | [`Error::Pairing`] | Do not retry | Link button never pressed |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//!
//! Only [`Error::ConnectionFailed`] is allowed to terminate the stream loop;
//! everything else is recovered locally.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the bridge or processing its data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection to the bridge was refused, reset or lost.
    #[error("Connection to bridge failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// HTTP request failed for a reason other than the transport.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The bridge answered with a non-success status code.
    #[error("Bridge returned HTTP {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The bridge reported an error in its response body.
    #[error("Bridge API error: {0}")]
    Api(String),

    /// Failed to parse data received from the bridge.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A sensor or service id is not part of the current topology.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Pairing with the bridge did not produce an application key.
    #[error("Pairing failed: {0}")]
    Pairing(String),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The export collaborator failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// The notifier collaborator failed.
    #[error("Notification failed: {0}")]
    Notify(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// True for transport-level failures, the only fatal stream condition.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_))
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether repeating the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Request(_) | Self::Io(_) => true,
            // 5xx and 429 are transient, other statuses are not
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::ConnectionFailed(_) => true,
            Self::Api(_)
            | Self::InvalidData(_)
            | Self::UnknownEntity(_)
            | Self::Pairing(_)
            | Self::Cancelled
            | Self::Export(_)
            | Self::Notify(_)
            | Self::InvalidConfig(_)
            | Self::Json(_) => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                operation: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "request".to_string()),
                duration: Duration::ZERO,
            }
        } else if err.is_connect() || err.is_body() {
            Error::ConnectionFailed(err.to_string())
        } else if let Some(status) = err.status() {
            Error::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            Error::Request(err.to_string())
        }
    }
}

impl From<huemon_types::ParseError> for Error {
    fn from(err: huemon_types::ParseError) -> Self {
        Error::InvalidData(err.to_string())
    }
}

/// Result type alias using huemon-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::timeout("PUT motion/abc", Duration::from_secs(3));
        assert!(err.to_string().contains("PUT motion/abc"));
        assert!(err.to_string().contains("3s"));

        let err = Error::Status {
            status: 503,
            url: "https://bridge/clip/v2/resource/device".to_string(),
        };
        assert!(err.to_string().contains("503"));

        let err = Error::invalid_data("missing owner");
        assert_eq!(err.to_string(), "Invalid data: missing owner");
    }

    #[test]
    fn test_classification() {
        assert!(Error::ConnectionFailed("reset".into()).is_transport());
        assert!(!Error::Request("oops".into()).is_transport());
        assert!(Error::timeout("stream", Duration::from_secs(1)).is_timeout());

        assert!(Error::Request("oops".into()).is_retryable());
        assert!(
            Error::Status {
                status: 503,
                url: String::new()
            }
            .is_retryable()
        );
        assert!(
            !Error::Status {
                status: 403,
                url: String::new()
            }
            .is_retryable()
        );
        assert!(!Error::invalid_data("x").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = huemon_types::ParseError::InvalidData("bad".into()).into();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }
}
