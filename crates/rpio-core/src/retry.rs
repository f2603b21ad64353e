// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Retry policies for session requests and connection attempts.
//!
//! - [`NoRetry`]: fail on the first error
//! - [`FixedDelay`]: a bounded number of attempts with a constant delay
//!
//! Only errors for which [`DriverError::is_retryable`] holds are retried.
//!
//! # Example
//!
//! ```rust,ignore
//! use rpio_core::retry::{FixedDelay, RetryStrategy};
//! use std::time::Duration;
//!
//! let strategy = FixedDelay::simple(3, Duration::from_millis(100));
//! let status = strategy.execute(|| session.probe()).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

// =============================================================================
// RetryConfig
// =============================================================================

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first (at least 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts.
    #[serde(default = "default_delay", with = "duration_millis")]
    pub delay: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay() -> Duration {
    Duration::from_millis(100)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_delay(),
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Sets the total number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the delay between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

// =============================================================================
// RetryStrategy
// =============================================================================

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry(Duration),
    /// Give up and return the error.
    DoNotRetry,
}

/// A retry policy.
#[async_trait]
pub trait RetryStrategy: Send + Sync {
    /// Returns the strategy name for logs.
    fn name(&self) -> &str;

    /// Decides whether to retry after the `attempt`-th failure (1-based).
    fn should_retry(&self, error: &DriverError, attempt: u32) -> RetryDecision;

    /// Runs `operation` until it succeeds or the policy gives up.
    ///
    /// The factory is called once per attempt and must produce a fresh future.
    async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, DriverError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, DriverError>> + Send,
        T: Send,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.should_retry(&error, attempt) {
                    RetryDecision::Retry(delay) => {
                        tracing::debug!(
                            strategy = %self.name(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry => return Err(error),
                },
            }
        }
    }
}

// =============================================================================
// Strategies
// =============================================================================

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

#[async_trait]
impl RetryStrategy for NoRetry {
    fn name(&self) -> &str {
        "no_retry"
    }

    fn should_retry(&self, _error: &DriverError, _attempt: u32) -> RetryDecision {
        RetryDecision::DoNotRetry
    }
}

/// Retries retryable errors with a constant delay.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    config: RetryConfig,
}

impl FixedDelay {
    /// Creates a fixed delay strategy from a configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Creates a fixed delay strategy.
    pub fn simple(max_attempts: u32, delay: Duration) -> Self {
        Self::new(
            RetryConfig::default()
                .with_max_attempts(max_attempts)
                .with_delay(delay),
        )
    }

    /// Returns the configured delay.
    pub fn delay(&self) -> Duration {
        self.config.delay
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl RetryStrategy for FixedDelay {
    fn name(&self) -> &str {
        "fixed_delay"
    }

    fn should_retry(&self, error: &DriverError, attempt: u32) -> RetryDecision {
        if attempt >= self.config.max_attempts || !error.is_retryable() {
            return RetryDecision::DoNotRetry;
        }
        RetryDecision::Retry(self.config.delay)
    }
}

// =============================================================================
// Serde helpers
// =============================================================================

/// Serializes a [`Duration`] as integer milliseconds.
pub mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serializes the duration.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    /// Deserializes the duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// =============================================================================
// Tests
// =============================================================================
