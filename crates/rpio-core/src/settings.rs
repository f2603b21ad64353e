// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Driver settings.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::duration_millis;
use crate::session::RequestPolicy;

/// What happens to signals of points found unavailable during connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    /// Invalidate the signal until a later connection finds the point.
    #[default]
    Invalidate,
    /// Leave the last value and validity untouched.
    KeepLast,
}

impl fmt::Display for UnavailablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailablePolicy::Invalidate => write!(f, "invalidate"),
            UnavailablePolicy::KeepLast => write!(f, "keep_last"),
        }
    }
}

/// Settings for one [`CyclicDriver`](crate::driver::CyclicDriver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Delay between connection attempts of the establisher.
    #[serde(default = "default_reconnect_delay", with = "duration_millis")]
    pub reconnect_delay: Duration,

    /// Timeout and retry policy for every session request.
    #[serde(default)]
    pub request: RequestPolicy,

    /// Treatment of unavailable points.
    #[serde(default)]
    pub unavailable_policy: UnavailablePolicy,
}

fn default_reconnect_delay() -> Duration {
    Duration::from_millis(1000)
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: default_reconnect_delay(),
            request: RequestPolicy::default(),
            unavailable_policy: UnavailablePolicy::default(),
        }
    }
}

impl DriverSettings {
    /// Sets the reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the request policy.
    pub fn with_request_policy(mut self, request: RequestPolicy) -> Self {
        self.request = request;
        self
    }

    /// Sets the unavailable-point policy.
    pub fn with_unavailable_policy(mut self, policy: UnavailablePolicy) -> Self {
        self.unavailable_policy = policy;
        self
    }
}
