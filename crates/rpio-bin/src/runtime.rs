// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Scheduler runtime orchestration.
//!
//! The runtime wires a loaded configuration to running drivers:
//!
//! - one simulated endpoint per distinct url, animated by waveform publishers
//! - one [`CyclicDriver`] per endpoint key, owned by a [`DriverRegistry`]
//! - a dedicated scheduler thread cycling every driver at a fixed period
//! - graceful shutdown that stops every driver and keeps cycling until all
//!   of them reached STOPPED

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rpio_config::{RpioConfig, WaveformConfig, WaveformKind, load_config};
use rpio_core::{
    CancelToken, CyclicDriver, DriverRegistry, DriverState, EndpointKey, PointId, Signal,
    SignalCell, StaticResolver,
};
use rpio_sim::{SimEndpoint, Waveform, WaveformPublisher};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// SchedulerRuntime
// =============================================================================

/// Runs the configured drivers until shutdown is signaled.
pub struct SchedulerRuntime {
    config: Arc<RpioConfig>,
    shutdown: ShutdownCoordinator,
    duration: Option<Duration>,
}

impl SchedulerRuntime {
    /// Creates a new runtime.
    pub fn new(config: RpioConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
            duration: None,
        }
    }

    /// Stops on its own after `duration`.
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &RpioConfig {
        &self.config
    }

    /// Returns the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Runs until a shutdown signal, the configured duration, or every
    /// driver stopping on its own.
    ///
    /// Must be called outside of any tokio runtime: drivers block on the
    /// runtime owned here from the scheduler thread.
    pub fn run(self) -> BinResult<()> {
        info!(version = rpio_core::VERSION, "Starting rpio scheduler");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("rpio-worker")
            .build()
            .map_err(|e| BinError::startup(format!("failed to build tokio runtime: {}", e)))?;

        let mut plant = Plant::build(&self.config, runtime.handle())?;
        let publishers = plant.spawn_publishers(runtime.handle());
        plant.prepare()?;

        info!(
            drivers = plant.registry.len(),
            endpoints = plant.endpoints.len(),
            points = self.config.point_count(),
            cycle_ms = self.config.scheduler.cycle_ms,
            "Scheduler ready"
        );

        let scheduler = Scheduler {
            plant,
            cycle: self.config.scheduler.cycle(),
            metrics_interval: self.config.scheduler.metrics_interval(),
            shutdown_timeout: self.config.scheduler.shutdown_timeout(),
            shutdown: self.shutdown.clone(),
        };
        let worker = thread::Builder::new()
            .name("rpio-scheduler".to_string())
            .spawn(move || scheduler.run())
            .map_err(|e| BinError::startup(format!("failed to spawn scheduler thread: {}", e)))?;

        let duration = self.duration;
        let shutdown = self.shutdown.clone();
        runtime.block_on(async move {
            match duration {
                Some(duration) => {
                    tokio::select! {
                        _ = shutdown.wait_for_shutdown() => {}
                        _ = tokio::time::sleep(duration) => {
                            info!(duration_ms = duration.as_millis() as u64, "Run duration elapsed");
                            shutdown.initiate_shutdown();
                        }
                    }
                }
                None => shutdown.wait_for_shutdown().await,
            }
        });

        let result = match worker.join() {
            Ok(summary) => {
                info!(
                    cycles = summary.cycles,
                    stopped = summary.stopped,
                    drivers = summary.drivers,
                    "Scheduler finished"
                );
                if summary.stopped < summary.drivers {
                    warn!(
                        pending = summary.drivers - summary.stopped,
                        "Shutdown timeout elapsed before every driver stopped"
                    );
                }
                Ok(())
            }
            Err(_) => Err(BinError::SchedulerPanicked),
        };

        for (cancel, _) in &publishers {
            cancel.cancel();
        }
        runtime.shutdown_timeout(self.config.scheduler.shutdown_timeout());

        info!("rpio shutdown complete");
        result
    }
}

// =============================================================================
// Plant
// =============================================================================

/// Drivers, their signals and the simulated endpoints behind them.
pub struct Plant {
    endpoints: BTreeMap<String, SimEndpoint>,
    publishers: Vec<WaveformPublisher>,
    registry: DriverRegistry,
    signals: BTreeMap<(EndpointKey, String), Arc<SignalCell>>,
    bound: BTreeMap<EndpointKey, Vec<String>>,
    resolvers: BTreeMap<EndpointKey, StaticResolver>,
    mirrors: Vec<Mirror>,
}

/// Copies a valid input value into an output signal every cycle.
struct Mirror {
    source: Arc<SignalCell>,
    target: Arc<SignalCell>,
}

impl Mirror {
    fn apply(&self) -> bool {
        let Some(value) = self.source.valid_value() else {
            return false;
        };
        if self.target.value().as_ref() == Some(&value) {
            return false;
        }
        self.target.set(value);
        true
    }
}

impl Plant {
    /// Builds endpoints, signals and drivers from `config`.
    ///
    /// Endpoint groups sharing a url share one simulated endpoint; groups
    /// sharing an endpoint key share one driver, configured by the first
    /// group.
    pub fn build(config: &RpioConfig, runtime: &Handle) -> BinResult<Self> {
        let mut endpoints: BTreeMap<String, SimEndpoint> = BTreeMap::new();
        let mut tracks: BTreeMap<String, (Duration, BTreeMap<PointId, Waveform>)> = BTreeMap::new();
        let mut registry = DriverRegistry::new();
        let mut signals = BTreeMap::new();
        let mut bound: BTreeMap<EndpointKey, Vec<String>> = BTreeMap::new();
        let mut resolvers: BTreeMap<EndpointKey, StaticResolver> = BTreeMap::new();

        for group in &config.endpoints {
            let endpoint = endpoints.entry(group.url.clone()).or_insert_with(|| {
                debug!(endpoint = %group.url, "Creating simulated endpoint");
                let endpoint = SimEndpoint::new(group.url.clone());
                endpoint.set_latency(Duration::from_millis(group.simulation.latency_ms));
                endpoint
            });

            let key = group.key();
            registry.get_or_insert_with(key.clone(), || {
                CyclicDriver::new(
                    group.name.clone(),
                    Arc::new(endpoint.factory()),
                    group.driver_settings(),
                    runtime.clone(),
                )
            });

            let (_, waveforms) = tracks.entry(group.url.clone()).or_insert_with(|| {
                (
                    Duration::from_millis(group.simulation.publish_interval_ms),
                    BTreeMap::new(),
                )
            });
            let resolver = resolvers.entry(key.clone()).or_default();

            for point in &group.points {
                let point_id = point.point_id();
                if !endpoint.has_point(&point_id) {
                    endpoint.add_point(point_id.clone(), point.initial_value());
                }
                if point.direction.is_input() {
                    let shape = point.waveform.as_ref().unwrap_or(&group.simulation.waveform);
                    waveforms
                        .entry(point_id.clone())
                        .or_insert_with(|| waveform_from(shape));
                }

                let cell = if point.direction.is_input() {
                    SignalCell::new(point.signal.clone())
                } else {
                    SignalCell::with_value(point.signal.clone(), point.initial_value())
                };
                signals.insert((key.clone(), point.signal.clone()), Arc::new(cell));
                resolver.insert(point.signal.clone(), point.descriptor());
                bound.entry(key.clone()).or_default().push(point.signal.clone());
            }
        }

        let mut mirrors = Vec::new();
        for group in &config.endpoints {
            let key = group.key();
            for point in &group.points {
                let Some(source_name) = &point.mirror else {
                    continue;
                };
                let source = signals.get(&(key.clone(), source_name.clone()));
                let target = signals.get(&(key.clone(), point.signal.clone()));
                match (source, target) {
                    (Some(source), Some(target)) => mirrors.push(Mirror {
                        source: Arc::clone(source),
                        target: Arc::clone(target),
                    }),
                    _ => {
                        return Err(BinError::config(format!(
                            "mirror of '{}' refers to unknown signal '{}'",
                            point.signal, source_name
                        )));
                    }
                }
            }
        }

        let publishers = tracks
            .into_iter()
            .filter_map(|(url, (interval, waveforms))| {
                let endpoint = endpoints.get(&url)?;
                let publisher = waveforms.into_iter().fold(
                    WaveformPublisher::new(endpoint.clone(), interval),
                    |publisher, (point_id, waveform)| publisher.track(point_id, waveform),
                );
                (!publisher.is_empty()).then_some(publisher)
            })
            .collect();

        Ok(Self {
            endpoints,
            publishers,
            registry,
            signals,
            bound,
            resolvers,
            mirrors,
        })
    }

    /// Binds every signal to its driver.
    pub fn prepare(&mut self) -> BinResult<()> {
        for (key, points) in &self.bound {
            let Some(resolver) = self.resolvers.get(key) else {
                continue;
            };
            let Some(driver) = self.registry.get_mut(key) else {
                continue;
            };
            let mut bindings: Vec<(Arc<dyn Signal>, String)> = Vec::with_capacity(points.len());
            for name in points {
                if let Some(cell) = self.signals.get(&(key.clone(), name.clone())) {
                    let signal: Arc<dyn Signal> = Arc::clone(cell) as Arc<dyn Signal>;
                    bindings.push((signal, name.clone()));
                }
            }
            driver
                .prepare(bindings, resolver)
                .map_err(|e| BinError::from(e).with_context(format!("preparing driver {}", key)))?;
        }
        Ok(())
    }

    /// Spawns one waveform publisher per simulated endpoint.
    pub fn spawn_publishers(&mut self, runtime: &Handle) -> Vec<(CancelToken, JoinHandle<()>)> {
        self.publishers
            .drain(..)
            .map(|publisher| {
                let cancel = CancelToken::new();
                let task = publisher.spawn(runtime, cancel.clone());
                (cancel, task)
            })
            .collect()
    }

    /// Runs one scheduler cycle: every driver, then every mirror.
    pub fn cycle(&mut self) -> usize {
        self.registry.run_all();
        self.mirrors.iter().filter(|mirror| mirror.apply()).count()
    }

    /// Returns the driver registry.
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Returns the simulated endpoint for `url`.
    pub fn endpoint(&self, url: &str) -> Option<&SimEndpoint> {
        self.endpoints.get(url)
    }

    /// Returns the signal `name` bound under `key`.
    pub fn signal(&self, key: &EndpointKey, name: &str) -> Option<&Arc<SignalCell>> {
        self.signals.get(&(key.clone(), name.to_string()))
    }

    /// Returns the number of publishers not yet spawned.
    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    /// Returns the number of mirrored outputs.
    pub fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }

    fn log_metrics(&self) {
        let transceiving = self.registry.count_in(DriverState::Transceiving);
        info!(
            drivers = self.registry.len(),
            transceiving,
            "Scheduler status"
        );
        for (key, driver) in self.registry.iter() {
            let snapshot = driver.metrics().snapshot();
            info!(
                driver = %driver.name(),
                key = %key,
                state = %driver.state(),
                cycles = snapshot.cycles,
                reconnects = snapshot.reconnects,
                notifications = snapshot.notifications,
                write_items = snapshot.write_items,
                write_rejections = snapshot.write_rejections,
                "Driver metrics"
            );
        }
    }
}

/// Converts a configured waveform into a simulator waveform.
pub fn waveform_from(config: &WaveformConfig) -> Waveform {
    let (min, max, period) = (config.min, config.max, config.period());
    match config.kind {
        WaveformKind::Constant => Waveform::Constant(min),
        WaveformKind::Ramp => Waveform::Ramp { min, max, period },
        WaveformKind::Sine => Waveform::Sine { min, max, period },
        WaveformKind::Square => Waveform::Square { min, max, period },
        WaveformKind::Random => Waveform::Random { min, max },
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Outcome of the scheduler thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    /// Cycles executed.
    pub cycles: u64,
    /// Registered drivers.
    pub drivers: usize,
    /// Drivers that reached STOPPED.
    pub stopped: usize,
}

/// The fixed-period loop run on the scheduler thread.
struct Scheduler {
    plant: Plant,
    cycle: Duration,
    metrics_interval: Option<Duration>,
    shutdown_timeout: Duration,
    shutdown: ShutdownCoordinator,
}

impl Scheduler {
    fn run(mut self) -> SchedulerSummary {
        let token = self.shutdown.token();
        let mut cycles = 0u64;
        let mut next = Instant::now();
        let mut last_report = Instant::now();
        let mut stopping_since: Option<Instant> = None;

        loop {
            if stopping_since.is_none() && token.is_shutdown() {
                self.plant.registry.stop_all();
                stopping_since = Some(Instant::now());
            }

            self.plant.cycle();
            cycles += 1;

            match stopping_since {
                Some(since) => {
                    if self.plant.registry.all_finished() {
                        break;
                    }
                    if since.elapsed() >= self.shutdown_timeout {
                        error!(
                            timeout_ms = self.shutdown_timeout.as_millis() as u64,
                            "Drivers did not stop in time"
                        );
                        break;
                    }
                }
                None => {
                    if self.plant.registry.all_finished() {
                        warn!("Every driver stopped; shutting down");
                        self.shutdown.initiate_shutdown();
                        break;
                    }
                }
            }

            if let Some(interval) = self.metrics_interval {
                if last_report.elapsed() >= interval {
                    self.plant.log_metrics();
                    last_report = Instant::now();
                }
            }

            next += self.cycle;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                debug!(overrun_ms = (now - next).as_millis() as u64, "Cycle overrun");
                next = now;
            }
        }

        self.plant.log_metrics();
        SchedulerSummary {
            cycles,
            drivers: self.plant.registry.len(),
            stopped: self.plant.registry.count_in(DriverState::Stopped),
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the scheduler runtime.
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<RpioConfig>,
    cycle_ms: Option<u64>,
    duration: Option<Duration>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: RpioConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the scheduler cycle period.
    pub fn cycle_ms(mut self, cycle_ms: Option<u64>) -> Self {
        self.cycle_ms = cycle_ms;
        self
    }

    /// Stops the runtime after `duration`.
    pub fn duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<SchedulerRuntime> {
        let mut config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;
                load_config(&path).map_err(|e| {
                    BinError::from(e).with_context(format!("loading {}", path.display()))
                })?
            }
        };

        if let Some(cycle_ms) = self.cycle_ms {
            config.scheduler.cycle_ms = cycle_ms;
        }
        config.validate()?;

        Ok(SchedulerRuntime::new(config).with_duration(self.duration))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rpio_config::{EndpointConfig, PointConfig};
    use rpio_core::{Direction, Value};

    use super::*;

    fn point(signal: &str, identifier: &str, direction: Direction) -> PointConfig {
        PointConfig::new(signal, "2", identifier, direction)
    }

    fn plant_config() -> RpioConfig {
        let mut mirrored = point("valve", "Valve", Direction::Output);
        mirrored.mirror = Some("level".to_string());

        let mut config = RpioConfig::default();
        config.endpoints.push(
            EndpointConfig::new("tank", "sim://plant")
                .with_point(point("level", "Level", Direction::Input))
                .with_point(mirrored),
        );
        config.endpoints.push(
            EndpointConfig::new("tank-extra", "sim://plant")
                .with_point(point("pressure", "Pressure", Direction::Input)),
        );
        config
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        assert!(RuntimeBuilder::new().build().is_err());
    }

    #[test]
    fn test_runtime_builder_applies_cycle_override() {
        let runtime = RuntimeBuilder::new()
            .config(plant_config())
            .cycle_ms(Some(25))
            .build()
            .unwrap();
        assert_eq!(runtime.config().scheduler.cycle_ms, 25);

        let result = RuntimeBuilder::new()
            .config(plant_config())
            .cycle_ms(Some(0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_plant_merges_groups_with_same_key() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut plant = Plant::build(&plant_config(), runtime.handle()).unwrap();
        plant.prepare().unwrap();

        assert_eq!(plant.registry().len(), 1);
        assert_eq!(plant.publisher_count(), 1);
        assert_eq!(plant.mirror_count(), 1);

        let key = EndpointKey::new("sim://plant", "default");
        let driver = plant.registry().get(&key).unwrap();
        assert_eq!(driver.name(), "tank");
        assert_eq!(driver.bindings().len(), 3);

        let endpoint = plant.endpoint("sim://plant").unwrap();
        assert_eq!(endpoint.points().len(), 3);
    }

    #[test]
    fn test_plant_cycles_and_mirrors() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut plant = Plant::build(&plant_config(), runtime.handle()).unwrap();
        plant.prepare().unwrap();
        let key = EndpointKey::new("sim://plant", "default");
        let endpoint = plant.endpoint("sim://plant").unwrap().clone();
        endpoint.set_value(&PointId::new("2", "Level"), 42.0f64);

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            plant.cycle();
            let written = endpoint.value(&PointId::new("2", "Valve")).and_then(|v| v.value);
            if written == Some(Value::Float64(42.0)) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        let level = plant.signal(&key, "level").unwrap();
        assert_eq!(level.valid_value(), Some(Value::Float64(42.0)));
        assert_eq!(
            endpoint.value(&PointId::new("2", "Valve")).and_then(|v| v.value),
            Some(Value::Float64(42.0))
        );

        plant.registry().stop_all();
        while !plant.registry().all_finished() {
            plant.cycle();
        }
    }

    #[test]
    fn test_waveform_from_config() {
        let config = WaveformConfig {
            kind: WaveformKind::Square,
            min: 1.0,
            max: 2.0,
            period_ms: 100,
        };
        assert_eq!(
            waveform_from(&config),
            Waveform::Square {
                min: 1.0,
                max: 2.0,
                period: Duration::from_millis(100)
            }
        );

        let constant = WaveformConfig {
            kind: WaveformKind::Constant,
            ..WaveformConfig::default()
        };
        assert_eq!(waveform_from(&constant), Waveform::Constant(0.0));
    }

    #[test]
    fn test_run_for_duration() {
        let mut config = plant_config();
        config.scheduler.cycle_ms = 10;
        config.scheduler.shutdown_timeout_ms = 2000;

        let runtime = RuntimeBuilder::new()
            .config(config)
            .duration(Some(Duration::from_millis(200)))
            .build()
            .unwrap();
        let shutdown = runtime.shutdown().clone();

        runtime.run().unwrap();
        assert!(shutdown.is_shutdown_initiated());
    }
}
