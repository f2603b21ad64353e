// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for rpio-core.
//!
//! Every failure a driver can observe is a [`DriverError`]. The driver never
//! inspects error messages; it only asks two questions:
//!
//! - [`DriverError::is_fatal`]: programming or invariant violations. The driver
//!   stops and never retries.
//! - [`DriverError::is_retryable`]: transient I/O. The driver invalidates its
//!   inputs, drops the session and reconnects.

use std::time::Duration;

use thiserror::Error;

use crate::types::StatusCode;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

// =============================================================================
// DriverError
// =============================================================================

/// Errors raised by remote sessions, the connection establisher and the
/// cyclic driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Opening the session failed.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A request did not complete within the bounded request timeout.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The timeout duration.
        duration: Duration,
    },

    /// The session is not open.
    #[error("Session is not connected")]
    NotConnected,

    /// The endpoint answered with a bad status code.
    #[error("{operation} returned bad status {status}")]
    BadStatus {
        /// The operation that reported the status.
        operation: String,
        /// The reported status.
        status: StatusCode,
    },

    /// One or more items of a batched write were rejected.
    #[error("Batched write rejected {rejected} of {total} item(s)")]
    WriteRejected {
        /// Number of items with a bad status.
        rejected: usize,
        /// Number of items in the batch.
        total: usize,
    },

    /// Protocol-level failure reported by the session.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },

    /// Creating or deleting a subscription failed.
    #[error("Subscription error: {message}")]
    Subscription {
        /// Error message.
        message: String,
    },

    /// A signal's locator could not be turned into a point descriptor.
    #[error("Cannot resolve address of signal '{signal}': {message}")]
    AddressResolution {
        /// The signal whose locator failed to resolve.
        signal: String,
        /// Error message.
        message: String,
    },

    /// The driver or session was configured inconsistently.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// Internal state is malformed. Never retried.
    #[error("Invariant violated: {message}")]
    Invariant {
        /// Error message.
        message: String,
    },

    /// The operation was cancelled by a shutdown request.
    #[error("Operation cancelled")]
    Cancelled,
}

impl DriverError {
    /// Creates a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection failed error with a source.
    pub fn connection_failed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: &'static str, duration: Duration) -> Self {
        Self::Timeout {
            operation,
            duration,
        }
    }

    /// Creates a bad status error.
    pub fn bad_status(operation: impl Into<String>, status: StatusCode) -> Self {
        Self::BadStatus {
            operation: operation.into(),
            status,
        }
    }

    /// Creates a write rejected error.
    pub fn write_rejected(rejected: usize, total: usize) -> Self {
        Self::WriteRejected { rejected, total }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a subscription error.
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription {
            message: message.into(),
        }
    }

    /// Creates an address resolution error.
    pub fn address_resolution(signal: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AddressResolution {
            signal: signal.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Returns `true` if this error must stop the driver for good.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::AddressResolution { .. }
                | DriverError::Configuration { .. }
                | DriverError::Invariant { .. }
        )
    }

    /// Returns `true` if this error is transient and warrants a reconnect.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionFailed { .. }
                | DriverError::Timeout { .. }
                | DriverError::NotConnected
                | DriverError::BadStatus { .. }
                | DriverError::WriteRejected { .. }
                | DriverError::Protocol { .. }
                | DriverError::Subscription { .. }
        )
    }

    /// Returns the error type as a static string for logging and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            DriverError::ConnectionFailed { .. } => "connection_failed",
            DriverError::Timeout { .. } => "timeout",
            DriverError::NotConnected => "not_connected",
            DriverError::BadStatus { .. } => "bad_status",
            DriverError::WriteRejected { .. } => "write_rejected",
            DriverError::Protocol { .. } => "protocol",
            DriverError::Subscription { .. } => "subscription",
            DriverError::AddressResolution { .. } => "address_resolution",
            DriverError::Configuration { .. } => "configuration",
            DriverError::Invariant { .. } => "invariant",
            DriverError::Cancelled => "cancelled",
        }
    }

    /// Adds endpoint context to the error message where the variant carries one.
    pub fn with_endpoint(self, endpoint: &str) -> Self {
        match self {
            DriverError::ConnectionFailed { message, source } => DriverError::ConnectionFailed {
                message: format!("[{}] {}", endpoint, message),
                source,
            },
            DriverError::Protocol { message } => DriverError::Protocol {
                message: format!("[{}] {}", endpoint, message),
            },
            DriverError::Subscription { message } => DriverError::Subscription {
                message: format!("[{}] {}", endpoint, message),
            },
            other => other,
        }
    }
}

// The boxed source is not `Clone`; clones keep its rendered text only.
impl Clone for DriverError {
    fn clone(&self) -> Self {
        match self {
            DriverError::ConnectionFailed { message, source } => DriverError::ConnectionFailed {
                message: match source {
                    Some(source) => format!("{}: {}", message, source),
                    None => message.clone(),
                },
                source: None,
            },
            DriverError::Timeout {
                operation,
                duration,
            } => DriverError::Timeout {
                operation: *operation,
                duration: *duration,
            },
            DriverError::NotConnected => DriverError::NotConnected,
            DriverError::BadStatus { operation, status } => DriverError::BadStatus {
                operation: operation.clone(),
                status: *status,
            },
            DriverError::WriteRejected { rejected, total } => DriverError::WriteRejected {
                rejected: *rejected,
                total: *total,
            },
            DriverError::Protocol { message } => DriverError::protocol(message.clone()),
            DriverError::Subscription { message } => DriverError::subscription(message.clone()),
            DriverError::AddressResolution { signal, message } => {
                DriverError::address_resolution(signal.clone(), message.clone())
            }
            DriverError::Configuration { message } => DriverError::configuration(message.clone()),
            DriverError::Invariant { message } => DriverError::invariant(message.clone()),
            DriverError::Cancelled => DriverError::Cancelled,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DriverError::timeout("probe", Duration::from_secs(1)).is_retryable());
        assert!(DriverError::NotConnected.is_retryable());
        assert!(DriverError::bad_status("probe", StatusCode::BAD_TIMEOUT).is_retryable());
        assert!(DriverError::write_rejected(1, 3).is_retryable());

        assert!(DriverError::invariant("handle table corrupted").is_fatal());
        assert!(DriverError::address_resolution("tank_level", "no such node").is_fatal());
        assert!(!DriverError::invariant("x").is_retryable());

        let cancelled = DriverError::Cancelled;
        assert!(!cancelled.is_fatal());
        assert!(!cancelled.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = DriverError::write_rejected(1, 3);
        assert_eq!(err.to_string(), "Batched write rejected 1 of 3 item(s)");

        let err = DriverError::timeout("read_batch", Duration::from_millis(500));
        assert_eq!(err.to_string(), "read_batch timed out after 500ms");
    }

    #[test]
    fn test_with_endpoint() {
        let err = DriverError::connection_failed("refused").with_endpoint("sim://plant");
        assert_eq!(err.to_string(), "Connection failed: [sim://plant] refused");

        let err = DriverError::NotConnected.with_endpoint("sim://plant");
        assert!(matches!(err, DriverError::NotConnected));
    }

    #[test]
    fn test_clone_keeps_source_text() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = DriverError::connection_failed_with("open", io);
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), "Connection failed: open: reset by peer");
        assert_eq!(cloned.error_type(), "connection_failed");
    }
}
