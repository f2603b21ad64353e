// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the rpio binary.

use thiserror::Error;

/// Result type alias for rpio-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the rpio binary.
///
/// Each variant maps to a distinct process exit code.
#[derive(Debug, Error)]
pub enum BinError {
    /// The configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Config loading error.
    #[error("Config error: {0}")]
    Config(#[from] rpio_config::ConfigError),

    /// The runtime, scheduler thread or log subscriber could not be set up.
    #[error("Startup error: {0}")]
    Startup(String),

    /// The scheduler thread panicked.
    #[error("Scheduler thread panicked")]
    SchedulerPanicked,

    /// Command output could not be rendered.
    #[error("Render error: {0}")]
    Render(#[from] serde_json::Error),

    /// Driver error.
    #[error("Driver error: {0}")]
    Driver(#[from] rpio_core::DriverError),

    /// An error wrapped with what was being done.
    #[error("{context}: {source}")]
    WithContext {
        /// The context description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a startup error.
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Startup(_) => 2,
            Self::SchedulerPanicked => 3,
            Self::Render(_) => 4,
            Self::Driver(_) => 5,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error and its cause chain on stderr.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

/// Reports an error and exits with the appropriate code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BinError::config("missing endpoints");
        assert_eq!(err.to_string(), "Configuration error: missing endpoints");
    }

    #[test]
    fn test_context_keeps_exit_code() {
        let err = BinError::from(rpio_core::DriverError::configuration("no points"))
            .with_context("preparing driver sim://tank/default");
        assert!(err.to_string().starts_with("preparing driver sim://tank/default: Driver error:"));
        assert_eq!(err.exit_code(), 5);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::config("x").exit_code(), 1);
        assert_eq!(BinError::startup("x").exit_code(), 2);
        assert_eq!(BinError::SchedulerPanicked.exit_code(), 3);

        let config: BinError = rpio_config::ConfigError::validation("scheduler", "bad").into();
        assert_eq!(config.exit_code(), 1);

        let driver: BinError = rpio_core::DriverError::configuration("bad").into();
        assert_eq!(driver.exit_code(), 5);
    }

    #[test]
    fn test_from_render_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BinError = json_err.into();
        assert!(matches!(err, BinError::Render(_)));
        assert_eq!(err.exit_code(), 4);
    }
}
