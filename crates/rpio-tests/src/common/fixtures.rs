// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built point layouts, driver settings and configuration documents so
//! that tests describe the same plant the same way.

use std::time::Duration;

use rpio_core::{
    Direction, DriverSettings, PointDescriptor, PointId, RequestPolicy, RetryConfig,
    StaticResolver, UnavailablePolicy, Value,
};
use rpio_sim::SimEndpoint;

// =============================================================================
// TestPoint
// =============================================================================

/// One signal to bind, with the point it maps to.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPoint {
    /// Signal name, also used as locator.
    pub signal: String,
    /// Remote point.
    pub point_id: PointId,
    /// Data direction.
    pub direction: Direction,
}

impl TestPoint {
    /// An input point in namespace `2`.
    pub fn input(signal: &str, identifier: &str) -> Self {
        Self::new(signal, identifier, Direction::Input)
    }

    /// An output point in namespace `2`.
    pub fn output(signal: &str, identifier: &str) -> Self {
        Self::new(signal, identifier, Direction::Output)
    }

    /// A bidirectional point in namespace `2`.
    pub fn bidirectional(signal: &str, identifier: &str) -> Self {
        Self::new(signal, identifier, Direction::Bidirectional)
    }

    fn new(signal: &str, identifier: &str, direction: Direction) -> Self {
        Self {
            signal: signal.to_string(),
            point_id: PointId::new("2", identifier),
            direction,
        }
    }

    /// Returns the point descriptor.
    pub fn descriptor(&self) -> PointDescriptor {
        PointDescriptor::new(self.point_id.clone(), self.direction)
    }
}

/// Builds a resolver keyed by signal name.
pub fn resolver_for(points: &[TestPoint]) -> StaticResolver {
    points.iter().fold(StaticResolver::new(), |resolver, point| {
        resolver.with(point.signal.clone(), point.descriptor())
    })
}

// =============================================================================
// Settings
// =============================================================================

/// Driver settings tuned for tests.
pub struct SettingsFixtures;

impl SettingsFixtures {
    /// Short reconnect delay and request timeout, one request attempt.
    pub fn fast() -> DriverSettings {
        DriverSettings::default()
            .with_reconnect_delay(Duration::from_millis(20))
            .with_request_policy(
                RequestPolicy::default()
                    .with_request_timeout(Duration::from_millis(500))
                    .with_retry(RetryConfig::no_retry()),
            )
    }

    /// Short reconnect delay and request timeout, with the shipped retry
    /// policy of two attempts 100 ms apart.
    pub fn default_retry() -> DriverSettings {
        DriverSettings::default()
            .with_reconnect_delay(Duration::from_millis(20))
            .with_request_policy(RequestPolicy::default().with_request_timeout(Duration::from_millis(200)))
    }

    /// Like [`fast`](Self::fast), keeping last values of unavailable points.
    pub fn keep_last() -> DriverSettings {
        Self::fast().with_unavailable_policy(UnavailablePolicy::KeepLast)
    }

    /// Like [`fast`](Self::fast), with a long reconnect delay.
    pub fn slow_reconnect() -> DriverSettings {
        Self::fast().with_reconnect_delay(Duration::from_secs(30))
    }
}

// =============================================================================
// Plant
// =============================================================================

/// A small tank plant used across suites.
pub struct PlantFixtures;

impl PlantFixtures {
    /// Endpoint url of the tank plant.
    pub const URL: &'static str = "sim://tank";

    /// Inputs `level`, `temperature`, `pressure`; outputs `valve`, `pump`,
    /// `heater`; bidirectional `setpoint`.
    pub fn tank_points() -> Vec<TestPoint> {
        vec![
            TestPoint::input("level", "Tank.Level"),
            TestPoint::input("temperature", "Tank.Temperature"),
            TestPoint::input("pressure", "Tank.Pressure"),
            TestPoint::output("valve", "Tank.Valve"),
            TestPoint::output("pump", "Tank.Pump"),
            TestPoint::output("heater", "Tank.Heater"),
            TestPoint::bidirectional("setpoint", "Tank.Setpoint"),
        ]
    }

    /// A simulated endpoint exposing every tank point.
    pub fn tank_endpoint() -> SimEndpoint {
        SimEndpoint::new(Self::URL)
            .with_point(PointId::new("2", "Tank.Level"), 0.0f64)
            .with_point(PointId::new("2", "Tank.Temperature"), 20.0f64)
            .with_point(PointId::new("2", "Tank.Pressure"), 1.0f64)
            .with_point(PointId::new("2", "Tank.Valve"), false)
            .with_point(PointId::new("2", "Tank.Pump"), false)
            .with_point(PointId::new("2", "Tank.Heater"), Value::Int32(0))
            .with_point(PointId::new("2", "Tank.Setpoint"), 50.0f64)
    }

    /// Returns the point id of `identifier` in namespace `2`.
    pub fn point(identifier: &str) -> PointId {
        PointId::new("2", identifier)
    }
}

// =============================================================================
// Configuration documents
// =============================================================================

/// Configuration files in every supported format.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// A complete YAML configuration.
    pub fn yaml() -> &'static str {
        r#"
scheduler:
  cycle_ms: 50
  metrics_interval_secs: 10
logging:
  level: debug
  format: json
endpoints:
  - name: tank
    url: sim://tank
    reconnect_delay_ms: 250
    unavailable_policy: keep_last
    simulation:
      latency_ms: 5
      waveform:
        kind: ramp
        min: 0
        max: 10
        period_ms: 1000
    points:
      - signal: level
        namespace: "2"
        identifier: Tank.Level
        direction: input
        size_bits: 32
      - signal: valve
        namespace: "2"
        identifier: Tank.Valve
        direction: output
        size_bits: 1
      - signal: level_copy
        namespace: "2"
        identifier: Tank.LevelCopy
        direction: output
        mirror: level
"#
    }

    /// The same plant in TOML.
    pub fn toml() -> &'static str {
        r#"
[scheduler]
cycle_ms = 50

[logging]
level = "debug"

[[endpoints]]
name = "tank"
url = "sim://tank"

[[endpoints.points]]
signal = "level"
namespace = "2"
identifier = "Tank.Level"
direction = "input"

[[endpoints.points]]
signal = "valve"
namespace = "2"
identifier = "Tank.Valve"
direction = "output"
initial = true
"#
    }

    /// The same plant in JSON.
    pub fn json() -> &'static str {
        r#"{
  "scheduler": { "cycle_ms": 50 },
  "endpoints": [
    {
      "name": "tank",
      "url": "sim://tank",
      "points": [
        { "signal": "level", "namespace": "2", "identifier": "Tank.Level", "direction": "input" },
        { "signal": "valve", "namespace": "2", "identifier": "Tank.Valve", "direction": "output" }
      ]
    }
  ]
}"#
    }
}
