// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! A [`CyclicDriver`] with its signals and an owned tokio runtime.
//!
//! The harness plays the scheduler: tests call [`DriverHarness::cycle`] from
//! the test thread, outside the runtime, exactly as the scheduler thread of
//! the `rpio` binary does. Use plain `#[test]` functions with it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;

use rpio_core::{CyclicDriver, DriverSettings, DriverState, SessionFactory, Signal, SignalCell};
use rpio_sim::SimEndpoint;

use super::fixtures::{TestPoint, SettingsFixtures, resolver_for};

/// Default time limit of the `*_until` helpers.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Pause between cycles in the `*_until` helpers.
pub const CYCLE_PAUSE: Duration = Duration::from_millis(2);

/// Builds a multi-thread runtime for driver tests.
pub fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("rpio-test")
        .enable_all()
        .build()
        .expect("Failed to build test runtime")
}

// =============================================================================
// DriverHarness
// =============================================================================

/// A driver bound to [`SignalCell`]s over a simulated endpoint.
pub struct DriverHarness {
    /// The driver under test.
    pub driver: CyclicDriver,
    /// The simulated endpoint behind the driver.
    pub endpoint: SimEndpoint,
    signals: BTreeMap<String, Arc<SignalCell>>,
    // Declared last so the driver drops while the runtime still runs.
    runtime: Runtime,
}

impl DriverHarness {
    /// Creates a prepared driver with [`SettingsFixtures::fast`].
    pub fn new(endpoint: SimEndpoint, points: &[TestPoint]) -> Self {
        Self::with_settings(endpoint, points, SettingsFixtures::fast())
    }

    /// Creates a prepared driver with explicit settings.
    pub fn with_settings(endpoint: SimEndpoint, points: &[TestPoint], settings: DriverSettings) -> Self {
        let factory: Arc<dyn SessionFactory> = Arc::new(endpoint.factory());
        Self::with_factory(endpoint, factory, points, settings)
    }

    /// Creates a prepared driver talking through `factory`.
    ///
    /// `endpoint` is kept for fault injection and inspection; it is usually
    /// the endpoint `factory` wraps.
    pub fn with_factory(
        endpoint: SimEndpoint,
        factory: Arc<dyn SessionFactory>,
        points: &[TestPoint],
        settings: DriverSettings,
    ) -> Self {
        let runtime = test_runtime();
        let mut driver = CyclicDriver::new("test-driver", factory, settings, runtime.handle().clone());

        let signals: BTreeMap<String, Arc<SignalCell>> = points
            .iter()
            .map(|p| (p.signal.clone(), Arc::new(SignalCell::new(p.signal.clone()))))
            .collect();
        let bound = points.iter().map(|p| {
            let signal: Arc<dyn Signal> = signals[&p.signal].clone();
            (signal, p.signal.clone())
        });
        driver
            .prepare(bound, &resolver_for(points))
            .expect("Failed to prepare driver");

        Self {
            driver,
            endpoint,
            signals,
            runtime,
        }
    }

    /// Returns the signal named `name`.
    pub fn signal(&self, name: &str) -> &Arc<SignalCell> {
        self.signals
            .get(name)
            .unwrap_or_else(|| panic!("no signal named '{}'", name))
    }

    /// Returns the owned runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Returns the driver state.
    pub fn state(&self) -> DriverState {
        self.driver.state()
    }

    /// Runs one cycle.
    pub fn cycle(&mut self) {
        self.driver.run();
    }

    /// Runs `count` cycles back to back.
    pub fn cycles(&mut self, count: usize) {
        for _ in 0..count {
            self.driver.run();
        }
    }

    /// Cycles until `done` holds or `timeout` elapses. Returns whether it held.
    pub fn cycle_until(&mut self, timeout: Duration, mut done: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.driver.run();
            if done(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(CYCLE_PAUSE);
        }
    }

    /// Cycles until the driver is TRANSCEIVING.
    pub fn run_until_transceiving(&mut self) -> bool {
        self.cycle_until(DEFAULT_WAIT, |h| h.state() == DriverState::Transceiving)
    }

    /// Waits, without cycling, until `done` holds or `timeout` elapses.
    pub fn wait_until(&self, timeout: Duration, mut done: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done(self) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(CYCLE_PAUSE);
        }
        true
    }

    /// Requests shutdown and cycles until the driver is STOPPED.
    pub fn stop_and_drain(&mut self) -> bool {
        self.driver.stop();
        self.cycle_until(DEFAULT_WAIT, |h| h.driver.is_finished())
    }
}
