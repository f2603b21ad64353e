// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Driver registry.
//!
//! One [`CyclicDriver`] exists per (endpoint, scope) pair. The registry owns
//! them and runs them in a stable key order each cycle.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::driver::CyclicDriver;
use crate::metrics::DriverMetricsSnapshot;
use crate::types::{DriverState, EndpointKey};

/// Owns every driver of a scheduler.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<EndpointKey, CyclicDriver>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the driver for `key`, creating it with `create` if missing.
    pub fn get_or_insert_with<F>(&mut self, key: EndpointKey, create: F) -> &mut CyclicDriver
    where
        F: FnOnce() -> CyclicDriver,
    {
        self.drivers.entry(key).or_insert_with_key(|key| {
            debug!(key = %key, "Registering driver");
            create()
        })
    }

    /// Returns the driver for `key`.
    pub fn get(&self, key: &EndpointKey) -> Option<&CyclicDriver> {
        self.drivers.get(key)
    }

    /// Returns the driver for `key` mutably.
    pub fn get_mut(&mut self, key: &EndpointKey) -> Option<&mut CyclicDriver> {
        self.drivers.get_mut(key)
    }

    /// Runs one cycle of every driver that has not finished.
    pub fn run_all(&mut self) {
        for driver in self.drivers.values_mut() {
            driver.run();
        }
    }

    /// Requests shutdown of every driver.
    pub fn stop_all(&self) {
        info!(drivers = self.drivers.len(), "Stopping all drivers");
        for driver in self.drivers.values() {
            driver.stop();
        }
    }

    /// Returns `true` once every driver reached STOPPED.
    pub fn all_finished(&self) -> bool {
        self.drivers.values().all(CyclicDriver::is_finished)
    }

    /// Counts drivers per state.
    pub fn count_in(&self, state: DriverState) -> usize {
        self.drivers.values().filter(|d| d.state() == state).count()
    }

    /// Returns a metrics snapshot per driver.
    pub fn snapshots(&self) -> Vec<(EndpointKey, DriverMetricsSnapshot)> {
        self.drivers
            .iter()
            .map(|(key, driver)| (key.clone(), driver.metrics().snapshot()))
            .collect()
    }

    /// Returns the number of drivers.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns `true` if no driver is registered.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Iterates over drivers in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&EndpointKey, &CyclicDriver)> {
        self.drivers.iter()
    }
}
