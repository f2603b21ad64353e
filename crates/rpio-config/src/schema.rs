// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema for rpio.
//!
//! ```yaml
//! scheduler:
//!   cycle_ms: 100
//! logging:
//!   level: info
//!   format: text
//! endpoints:
//!   - name: plant
//!     url: sim://plant
//!     scope: line-1
//!     points:
//!       - { signal: level, namespace: "2", identifier: Tank.Level, direction: input }
//!       - { signal: pump, namespace: "2", identifier: Pump.Run, direction: output, mirror: level }
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rpio_core::{
    Direction, DriverSettings, EndpointKey, PointDescriptor, PointId, RequestPolicy, RetryConfig,
    StaticResolver, UnavailablePolicy, Value,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Root
// =============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpioConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Endpoint groups. Entries sharing url and scope feed one driver.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl RpioConfig {
    /// Validates the whole configuration, collecting every failure.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.scheduler.validate() {
            errors.push(e);
        }

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            endpoint.validate(&format!("endpoints[{}]", i), &mut errors);
        }

        // Signal names are unique per driver, across all entries feeding it.
        let mut seen: HashMap<EndpointKey, HashSet<&str>> = HashMap::new();
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let names = seen.entry(endpoint.key()).or_default();
            for point in &endpoint.points {
                if !point.signal.is_empty() && !names.insert(point.signal.as_str()) {
                    errors.push(ConfigError::validation(
                        format!("endpoints[{}].points", i),
                        format!("duplicate signal '{}' for {}", point.signal, endpoint.key()),
                    ));
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::ValidationErrors(errors)),
        }
    }

    /// Returns the number of configured points.
    pub fn point_count(&self) -> usize {
        self.endpoints.iter().map(|e| e.points.len()).sum()
    }

    /// Returns the distinct driver keys, in first-seen order.
    pub fn driver_keys(&self) -> Vec<EndpointKey> {
        let mut keys: Vec<EndpointKey> = Vec::new();
        for endpoint in &self.endpoints {
            let key = endpoint.key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::parse("<effective>", e.to_string()))
    }

    /// Renders the configuration as pretty JSON.
    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::parse("<effective>", e.to_string()))
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Cycle settings of the scheduler thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cycle period in milliseconds.
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,

    /// Interval of metrics summaries in seconds. Zero disables them.
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,

    /// Upper bound for the shutdown phase, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_cycle_ms() -> u64 {
    100
}

fn default_metrics_interval_secs() -> u64 {
    30
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_ms: default_cycle_ms(),
            metrics_interval_secs: default_metrics_interval_secs(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Validates the scheduler configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cycle_ms == 0 {
            return Err(ConfigError::validation("scheduler.cycle_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// Returns the cycle period.
    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.cycle_ms)
    }

    /// Returns the metrics interval, or `None` when disabled.
    pub fn metrics_interval(&self) -> Option<Duration> {
        (self.metrics_interval_secs > 0).then(|| Duration::from_secs(self.metrics_interval_secs))
    }

    /// Returns the shutdown timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
    /// Compact text.
    Compact,
}

impl LogFormat {
    /// Returns the format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

// =============================================================================
// Endpoint
// =============================================================================

/// One endpoint group: an endpoint, an addressing scope and its points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Display name, used as the driver name.
    pub name: String,

    /// Endpoint locator.
    pub url: String,

    /// Addressing scope within the endpoint.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Delay between connection attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Attempts for idempotent requests.
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,

    /// Delay between request attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Treatment of points found unavailable.
    #[serde(default)]
    pub unavailable_policy: UnavailablePolicy,

    /// Simulated endpoint behaviour.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Points bound through this endpoint.
    #[serde(default)]
    pub points: Vec<PointConfig>,
}

fn default_scope() -> String {
    "default".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_request_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl EndpointConfig {
    /// Creates an endpoint group with default settings and no points.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            scope: default_scope(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            request_retries: default_request_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            unavailable_policy: UnavailablePolicy::default(),
            simulation: SimulationConfig::default(),
            points: Vec::new(),
        }
    }

    /// Adds a point, builder style.
    pub fn with_point(mut self, point: PointConfig) -> Self {
        self.points.push(point);
        self
    }

    /// Returns the driver key of this group.
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.url.clone(), self.scope.clone())
    }

    /// Builds the driver settings.
    pub fn driver_settings(&self) -> DriverSettings {
        let request = RequestPolicy::default()
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
            .with_retry(
                RetryConfig::default()
                    .with_max_attempts(self.request_retries)
                    .with_delay(Duration::from_millis(self.retry_delay_ms)),
            );
        DriverSettings::default()
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .with_request_policy(request)
            .with_unavailable_policy(self.unavailable_policy)
    }

    /// Builds a resolver mapping each signal name to its descriptor.
    pub fn resolver(&self) -> StaticResolver {
        let mut resolver = StaticResolver::new();
        for point in &self.points {
            resolver.insert(point.signal.clone(), point.descriptor());
        }
        resolver
    }

    fn validate(&self, field: &str, errors: &mut Vec<ConfigError>) {
        if self.name.trim().is_empty() {
            errors.push(ConfigError::validation(format!("{}.name", field), "must not be empty"));
        }
        if self.url.trim().is_empty() {
            errors.push(ConfigError::validation(format!("{}.url", field), "must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            errors.push(ConfigError::validation(
                format!("{}.request_timeout_ms", field),
                "must be greater than 0",
            ));
        }
        if self.reconnect_delay_ms == 0 {
            errors.push(ConfigError::validation(
                format!("{}.reconnect_delay_ms", field),
                "must be greater than 0",
            ));
        }
        if self.request_retries == 0 {
            errors.push(ConfigError::validation(
                format!("{}.request_retries", field),
                "must be at least 1",
            ));
        }

        self.simulation.validate(&format!("{}.simulation", field), errors);

        for (i, point) in self.points.iter().enumerate() {
            let field = format!("{}.points[{}]", field, i);
            point.validate(&field, errors);

            if let Some(target) = &point.mirror {
                match self.points.iter().find(|p| &p.signal == target) {
                    None => errors.push(ConfigError::validation(
                        format!("{}.mirror", field),
                        format!("unknown signal '{}'", target),
                    )),
                    Some(source) if !source.direction.is_input() => {
                        errors.push(ConfigError::validation(
                            format!("{}.mirror", field),
                            format!("signal '{}' is not an input", target),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

// =============================================================================
// Point
// =============================================================================

/// One signal bound to a remote point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    /// Local signal name.
    pub signal: String,

    /// Point namespace.
    #[serde(default)]
    pub namespace: String,

    /// Point identifier within the namespace.
    pub identifier: String,

    /// Data direction.
    pub direction: Direction,

    /// Bit width hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bits: Option<u32>,

    /// Input signal whose value this output follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<String>,

    /// Initial value of the simulated point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<InitialValue>,

    /// Waveform overriding the endpoint's simulation default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform: Option<WaveformConfig>,
}

impl PointConfig {
    /// Creates a point with no optional settings.
    pub fn new(
        signal: impl Into<String>,
        namespace: impl Into<String>,
        identifier: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            signal: signal.into(),
            namespace: namespace.into(),
            identifier: identifier.into(),
            direction,
            size_bits: None,
            mirror: None,
            initial: None,
            waveform: None,
        }
    }

    /// Returns the remote point identifier.
    pub fn point_id(&self) -> PointId {
        PointId::new(self.namespace.clone(), self.identifier.clone())
    }

    /// Returns the point descriptor.
    pub fn descriptor(&self) -> PointDescriptor {
        let descriptor = PointDescriptor::new(self.point_id(), self.direction);
        match self.size_bits {
            Some(bits) => descriptor.with_size_bits(bits),
            None => descriptor,
        }
    }

    /// Returns the initial value, derived from `size_bits` when not set.
    pub fn initial_value(&self) -> Value {
        if let Some(initial) = &self.initial {
            return initial.to_value();
        }
        match self.size_bits {
            Some(1) => Value::Bool(false),
            Some(16) => Value::Int16(0),
            Some(32) => Value::Int32(0),
            Some(64) => Value::Int64(0),
            _ => Value::Float64(0.0),
        }
    }

    fn validate(&self, field: &str, errors: &mut Vec<ConfigError>) {
        if self.signal.trim().is_empty() {
            errors.push(ConfigError::validation(format!("{}.signal", field), "must not be empty"));
        }
        if self.identifier.trim().is_empty() {
            errors.push(ConfigError::validation(
                format!("{}.identifier", field),
                "must not be empty",
            ));
        }
        if let Some(0) = self.size_bits {
            errors.push(ConfigError::validation(
                format!("{}.size_bits", field),
                "must be greater than 0",
            ));
        }
        if self.mirror.is_some() && !self.direction.is_output() {
            errors.push(ConfigError::validation(
                format!("{}.mirror", field),
                "only output points can mirror",
            ));
        }
        if let Some(waveform) = &self.waveform {
            waveform.validate(&format!("{}.waveform", field), errors);
        }
    }
}

/// A literal initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialValue {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal.
    Text(String),
}

impl InitialValue {
    /// Converts to a point value.
    pub fn to_value(&self) -> Value {
        match self {
            InitialValue::Bool(v) => Value::Bool(*v),
            InitialValue::Integer(v) => Value::Int64(*v),
            InitialValue::Float(v) => Value::Float64(*v),
            InitialValue::Text(v) => Value::String(v.clone()),
        }
    }
}

// =============================================================================
// Simulation
// =============================================================================

/// Behaviour of a simulated endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Delay before every answer.
    #[serde(default)]
    pub latency_ms: u64,

    /// Interval between waveform updates of input points.
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Default waveform of input points.
    #[serde(default)]
    pub waveform: WaveformConfig,
}

fn default_publish_interval_ms() -> u64 {
    200
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            publish_interval_ms: default_publish_interval_ms(),
            waveform: WaveformConfig::default(),
        }
    }
}

impl SimulationConfig {
    fn validate(&self, field: &str, errors: &mut Vec<ConfigError>) {
        if self.publish_interval_ms == 0 {
            errors.push(ConfigError::validation(
                format!("{}.publish_interval_ms", field),
                "must be greater than 0",
            ));
        }
        self.waveform.validate(&format!("{}.waveform", field), errors);
    }
}

/// Waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformKind {
    /// Fixed at `min`.
    Constant,
    /// Sawtooth from `min` to `max`.
    Ramp,
    /// Sine between `min` and `max`.
    #[default]
    Sine,
    /// Alternates between `min` and `max`.
    Square,
    /// Uniform noise.
    Random,
}

/// Waveform settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformConfig {
    /// Shape.
    #[serde(default)]
    pub kind: WaveformKind,
    /// Lower bound.
    #[serde(default)]
    pub min: f64,
    /// Upper bound.
    #[serde(default = "default_waveform_max")]
    pub max: f64,
    /// Period in milliseconds.
    #[serde(default = "default_waveform_period_ms")]
    pub period_ms: u64,
}

fn default_waveform_max() -> f64 {
    100.0
}

fn default_waveform_period_ms() -> u64 {
    10_000
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            kind: WaveformKind::default(),
            min: 0.0,
            max: default_waveform_max(),
            period_ms: default_waveform_period_ms(),
        }
    }
}

impl WaveformConfig {
    /// Returns the period.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    fn validate(&self, field: &str, errors: &mut Vec<ConfigError>) {
        if self.min > self.max {
            errors.push(ConfigError::validation(
                field.to_string(),
                format!("min ({}) exceeds max ({})", self.min, self.max),
            ));
        }
        let periodic = matches!(
            self.kind,
            WaveformKind::Ramp | WaveformKind::Sine | WaveformKind::Square
        );
        if periodic && self.period_ms == 0 {
            errors.push(ConfigError::validation(
                format!("{}.period_ms", field),
                "must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant() -> EndpointConfig {
        EndpointConfig::new("plant", "sim://plant")
            .with_point(PointConfig::new("level", "2", "Tank.Level", Direction::Input))
            .with_point(PointConfig::new("pump", "2", "Pump.Run", Direction::Output))
    }

    #[test]
    fn test_defaults() {
        let config = RpioConfig::default();
        assert_eq!(config.scheduler.cycle_ms, 100);
        assert_eq!(config.scheduler.metrics_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_driver_settings() {
        let mut endpoint = plant();
        endpoint.request_timeout_ms = 250;
        endpoint.request_retries = 3;
        endpoint.unavailable_policy = UnavailablePolicy::KeepLast;

        let settings = endpoint.driver_settings();
        assert_eq!(settings.reconnect_delay, Duration::from_millis(1000));
        assert_eq!(settings.request.request_timeout, Duration::from_millis(250));
        assert_eq!(settings.request.retry.max_attempts, 3);
        assert_eq!(settings.unavailable_policy, UnavailablePolicy::KeepLast);
    }

    #[test]
    fn test_resolver_uses_signal_names() {
        use rpio_core::AddressResolver;

        let resolver = plant().resolver();
        let descriptor = resolver.resolve("pump").unwrap();
        assert_eq!(descriptor.point_id, PointId::new("2", "Pump.Run"));
        assert_eq!(descriptor.direction, Direction::Output);
        assert!(resolver.resolve("Pump.Run").is_err());
    }

    #[test]
    fn test_mirror_validation() {
        let mut endpoint = plant();
        endpoint.points[1].mirror = Some("level".to_string());
        let config = RpioConfig {
            endpoints: vec![endpoint.clone()],
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        endpoint.points[1].mirror = Some("pump".to_string());
        let config = RpioConfig {
            endpoints: vec![endpoint],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("is not an input"));
    }

    #[test]
    fn test_duplicate_signal_across_entries() {
        let second = EndpointConfig::new("plant-b", "sim://plant")
            .with_point(PointConfig::new("level", "3", "Other", Direction::Input));
        let config = RpioConfig {
            endpoints: vec![plant(), second],
            ..Default::default()
        };
        assert_eq!(config.driver_keys().len(), 1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate signal 'level'"));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut endpoint = plant();
        endpoint.url = String::new();
        endpoint.request_timeout_ms = 0;
        let config = RpioConfig {
            scheduler: SchedulerConfig {
                cycle_ms: 0,
                ..Default::default()
            },
            endpoints: vec![endpoint],
            ..Default::default()
        };
        match config.validate().unwrap_err() {
            ConfigError::ValidationErrors(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected aggregated errors, got {other}"),
        }
    }

    #[test]
    fn test_initial_value() {
        let mut point = PointConfig::new("flag", "2", "Flag", Direction::Input);
        assert_eq!(point.initial_value(), Value::Float64(0.0));
        point.size_bits = Some(1);
        assert_eq!(point.initial_value(), Value::Bool(false));
        point.initial = Some(InitialValue::Integer(7));
        assert_eq!(point.initial_value(), Value::Int64(7));
    }

    #[test]
    fn test_waveform_validation() {
        let mut errors = Vec::new();
        WaveformConfig {
            kind: WaveformKind::Square,
            min: 5.0,
            max: 1.0,
            period_ms: 0,
        }
        .validate("w", &mut errors);
        assert_eq!(errors.len(), 2);
    }
}
