// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The cyclic driver.
//!
//! A [`CyclicDriver`] is called once per scheduler cycle through
//! [`run`](CyclicDriver::run). It owns a small state machine:
//!
//! ```text
//!            ┌──────────────────────── recoverable failure ─────────────┐
//!            ▼                                                          │
//!  IDLE ──► CONNECTING ── establisher connected ──► TRANSCEIVING ───────┘
//!            │                                          │
//!            └──── stop() ───► CLOSING ◄──── stop() ────┘
//!                                 │
//!   fatal error / panic ──────► STOPPED ◄──────┘
//! ```
//!
//! Connecting never blocks the cycle: the handshake runs in a
//! [`ConnectionEstablisher`] task and is only polled. While transceiving,
//! each cycle probes the session, copies pushed input values into signals and
//! issues one batched write; these requests are bounded by the session's
//! request policy.
//!
//! `run()` blocks on the runtime handle and must therefore be called from a
//! thread that is not itself driving the tokio runtime.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::address::AddressResolver;
use crate::binding::PointBinding;
use crate::error::{DriverError, DriverResult};
use crate::establisher::{
    CancelToken, Connection, ConnectionEstablisher, EstablishHandle, EstablishOutcome,
};
use crate::metrics::DriverMetrics;
use crate::session::{RemoteSession, SessionFactory, WriteItem};
use crate::settings::{DriverSettings, UnavailablePolicy};
use crate::signal::Signal;
use crate::types::DriverState;

// =============================================================================
// StopHandle
// =============================================================================

/// Requests shutdown of a driver from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    establishing: Arc<Mutex<Option<CancelToken>>>,
}

impl StopHandle {
    /// Requests shutdown and cancels an in-flight establishment.
    ///
    /// The driver tears down on its next cycle.
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Some(token) = self.establishing.lock().as_ref() {
            token.cancel();
        }
    }

    /// Returns `true` once shutdown was requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn track(&self, token: Option<CancelToken>) {
        *self.establishing.lock() = token;
    }
}

// =============================================================================
// CyclicDriver
// =============================================================================

/// Per-cycle driver for one endpoint and addressing scope.
pub struct CyclicDriver {
    name: String,
    factory: Arc<dyn SessionFactory>,
    settings: DriverSettings,
    runtime: Handle,
    bindings: Arc<[Arc<PointBinding>]>,
    state: DriverState,
    /// Set while exactly one establisher is in flight.
    connecting: bool,
    connected: bool,
    establisher: Option<EstablishHandle>,
    connection: Option<Connection>,
    stop: StopHandle,
    link_fault: bool,
    metrics: Arc<DriverMetrics>,
}

impl CyclicDriver {
    /// Creates an idle driver with no bound signals.
    pub fn new(
        name: impl Into<String>,
        factory: Arc<dyn SessionFactory>,
        settings: DriverSettings,
        runtime: Handle,
    ) -> Self {
        Self {
            name: name.into(),
            factory,
            settings,
            runtime,
            bindings: Arc::from(Vec::new()),
            state: DriverState::Idle,
            connecting: false,
            connected: false,
            establisher: None,
            connection: None,
            stop: StopHandle::default(),
            link_fault: false,
            metrics: Arc::new(DriverMetrics::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Returns the driver name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the endpoint locator.
    pub fn endpoint(&self) -> &str {
        self.factory.endpoint()
    }

    /// Returns the current state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Returns `true` once the driver reached STOPPED.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns `true` while a connection is adopted.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns `true` while an establisher is in flight.
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    /// Returns the bindings created by [`prepare`](Self::prepare).
    pub fn bindings(&self) -> &[Arc<PointBinding>] {
        &self.bindings
    }

    /// Returns the binding of the signal called `name`.
    pub fn binding(&self, name: &str) -> Option<&Arc<PointBinding>> {
        self.bindings.iter().find(|b| b.name() == name)
    }

    /// Returns the driver metrics.
    pub fn metrics(&self) -> &Arc<DriverMetrics> {
        &self.metrics
    }

    /// Returns the settings.
    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Returns a handle that can stop the driver from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // -------------------------------------------------------------------------
    // Scheduler interface
    // -------------------------------------------------------------------------

    /// Binds signals to remote points. Called once before cycling.
    ///
    /// Each signal comes with its locator; `resolver` turns the locator into
    /// a point descriptor. A resolution failure is fatal and leaves the driver
    /// unprepared.
    pub fn prepare<I>(&mut self, signals: I, resolver: &dyn AddressResolver) -> DriverResult<()>
    where
        I: IntoIterator<Item = (Arc<dyn Signal>, String)>,
    {
        if self.state != DriverState::Idle || self.connecting || self.connection.is_some() {
            return Err(DriverError::configuration(format!(
                "driver '{}' cannot be prepared in state {}",
                self.name, self.state
            )));
        }

        let mut bindings = Vec::new();
        for (signal, locator) in signals {
            let descriptor = resolver.resolve(&locator).map_err(|e| {
                DriverError::address_resolution(signal.name(), format!("'{}': {}", locator, e))
            })?;
            debug!(
                driver = %self.name,
                signal = %signal.name(),
                point = %descriptor.point_id,
                direction = %descriptor.direction,
                "Signal bound"
            );
            bindings.push(Arc::new(PointBinding::new(descriptor, signal)));
        }

        info!(
            driver = %self.name,
            endpoint = %self.endpoint(),
            inputs = bindings.iter().filter(|b| b.direction().is_input()).count(),
            outputs = bindings.iter().filter(|b| b.direction().is_output()).count(),
            "Driver prepared"
        );
        self.bindings = Arc::from(bindings);
        Ok(())
    }

    /// Executes one cycle.
    ///
    /// Never propagates errors or panics: recoverable failures fall back to
    /// reconnecting, anything else forces STOPPED.
    pub fn run(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.metrics.record_cycle();

        if self.stop.is_requested() && self.state != DriverState::Closing {
            debug!(driver = %self.name, from = %self.state, "Shutdown requested");
            self.state = DriverState::Closing;
        }

        let cycle = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Err(error) = self.step() {
                self.handle_failure(error);
            }
        }));

        if let Err(payload) = cycle {
            error!(
                driver = %self.name,
                state = %self.state,
                panic = %panic_message(payload.as_ref()),
                "Cycle panicked; stopping driver"
            );
            self.metrics.record_fatal_stop();
            self.metrics.record_error("cycle panicked");
            self.force_stop();
            let _ = panic::catch_unwind(AssertUnwindSafe(|| self.invalidate_inputs()));
        }
    }

    /// Requests shutdown. The next [`run`](Self::run) tears down.
    pub fn stop(&self) {
        self.stop.stop();
    }

    // -------------------------------------------------------------------------
    // State machine
    // -------------------------------------------------------------------------

    fn step(&mut self) -> DriverResult<()> {
        match self.state {
            DriverState::Idle => {
                self.connected = false;
                self.connecting = false;
                self.establisher = None;
                self.state = DriverState::Connecting;
                self.poll_connecting()
            }
            DriverState::Connecting => self.poll_connecting(),
            DriverState::Transceiving => self.exchange(),
            DriverState::Closing => {
                self.close();
                Ok(())
            }
            DriverState::Stopped => Ok(()),
        }
    }

    fn poll_connecting(&mut self) -> DriverResult<()> {
        if !self.connecting {
            self.start_establisher();
            return Ok(());
        }

        let Some(handle) = self.establisher.as_mut() else {
            return Err(DriverError::invariant(
                "connection attempt flagged in flight without a task",
            ));
        };

        match handle.try_outcome() {
            None => Ok(()),
            Some(outcome) => {
                self.establisher = None;
                self.connecting = false;
                self.stop.track(None);
                match outcome {
                    EstablishOutcome::Connected(connection) => {
                        self.adopt(connection);
                        Ok(())
                    }
                    EstablishOutcome::Cancelled => Ok(()),
                    EstablishOutcome::Failed(error) => Err(error),
                }
            }
        }
    }

    fn start_establisher(&mut self) {
        let cancel = CancelToken::new();
        let establisher = ConnectionEstablisher::new(
            self.name.clone(),
            Arc::clone(&self.factory),
            Arc::clone(&self.bindings),
            self.settings.clone(),
            Arc::clone(&self.metrics),
            cancel.clone(),
        );

        self.connecting = true;
        self.metrics.record_establishment_started();
        self.establisher = Some(establisher.spawn(&self.runtime));
        self.stop.track(Some(cancel));
        debug!(driver = %self.name, endpoint = %self.endpoint(), "Connection establishment started");
    }

    fn adopt(&mut self, connection: Connection) {
        if self.settings.unavailable_policy == UnavailablePolicy::Invalidate {
            for binding in self.bindings.iter() {
                if binding.direction().is_input() && !binding.is_available() {
                    binding.signal().invalidate();
                }
            }
        }

        if self.link_fault {
            info!(driver = %self.name, endpoint = %self.endpoint(), "Connection restored");
            self.link_fault = false;
        }

        self.connection = Some(connection);
        self.connected = true;
        self.state = DriverState::Transceiving;
    }

    /// One TRANSCEIVING cycle: probe, inputs, then the batched write.
    fn exchange(&self) -> DriverResult<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Err(DriverError::invariant("transceiving without a connection"));
        };
        let session = &connection.session;

        let status = match self.block_on(session.probe_once()) {
            Ok(status) => status,
            Err(e) => {
                self.metrics.record_probe_failure();
                return Err(e);
            }
        };
        if status.is_bad() {
            self.metrics.record_probe_failure();
            return Err(DriverError::bad_status("probe", status));
        }

        self.refresh_inputs();
        self.flush_outputs(session)
    }

    fn refresh_inputs(&self) {
        for binding in self.bindings.iter() {
            if !binding.direction().is_input() || !binding.is_available() {
                continue;
            }
            let Some(update) = binding.take_update() else {
                continue;
            };

            match update.usable_value() {
                Some(value) => {
                    binding.signal().check_in(value.clone(), true);
                    if binding.clear_fault() {
                        info!(
                            driver = %self.name,
                            signal = %binding.name(),
                            point = %binding.point_id(),
                            "Point recovered"
                        );
                    }
                }
                None => {
                    binding.signal().invalidate();
                    if binding.enter_fault() {
                        warn!(
                            driver = %self.name,
                            signal = %binding.name(),
                            point = %binding.point_id(),
                            status = %update.status,
                            "Point reports bad status; signal invalidated"
                        );
                    }
                }
            }
        }
    }

    fn flush_outputs(&self, session: &dyn RemoteSession) -> DriverResult<()> {
        let outputs = || self.bindings.iter().filter(|b| b.direction().is_output());

        for binding in outputs() {
            if let Some(sample) = binding.signal().check_out() {
                if sample.valid {
                    binding.queue_write(sample.value);
                } else {
                    debug!(driver = %self.name, signal = %binding.name(), "Invalid output sample not written");
                }
            }
        }

        let mut batch: Vec<&Arc<PointBinding>> = Vec::new();
        let mut items: Vec<WriteItem> = Vec::new();
        for binding in outputs().filter(|b| b.is_available()) {
            if let Some(value) = binding.pending_write() {
                items.push(WriteItem {
                    point_id: binding.point_id().clone(),
                    value,
                });
                batch.push(binding);
            }
        }
        if items.is_empty() {
            return Ok(());
        }

        let statuses = self.block_on(session.write_batch(&items))?;

        let mut rejected = 0;
        for (binding, status) in batch.iter().zip(statuses) {
            binding.complete_write(status);
            binding.signal().set_write_status(status);
            if status.is_bad() {
                rejected += 1;
                warn!(
                    driver = %self.name,
                    signal = %binding.name(),
                    point = %binding.point_id(),
                    status = %status,
                    "Write rejected"
                );
            }
        }
        self.metrics.record_write_batch(items.len(), rejected);

        if rejected > 0 {
            return Err(DriverError::write_rejected(rejected, items.len()));
        }
        Ok(())
    }

    fn handle_failure(&mut self, error: DriverError) {
        self.metrics.record_error(&error.to_string());

        if !error.is_retryable() {
            error!(
                driver = %self.name,
                state = %self.state,
                error = %error,
                error_type = error.error_type(),
                "Unrecoverable driver error; stopping"
            );
            self.metrics.record_fatal_stop();
            self.force_stop();
            self.invalidate_inputs();
            return;
        }

        if self.link_fault {
            debug!(driver = %self.name, error = %error, "Connection failed again; reconnecting");
        } else {
            warn!(
                driver = %self.name,
                endpoint = %self.endpoint(),
                error = %error,
                "Connection lost; reconnecting"
            );
            self.link_fault = true;
        }

        self.metrics.record_reconnect();
        self.invalidate_inputs();
        self.drop_connection();
        self.state = DriverState::Idle;
    }

    fn invalidate_inputs(&self) {
        for binding in self.bindings.iter() {
            if binding.direction().is_input() {
                binding.signal().invalidate();
            }
        }
    }

    /// Detaches the connection and closes it in the background.
    fn drop_connection(&mut self) {
        self.connected = false;
        if let Some(connection) = self.connection.take() {
            connection.detach();
            self.runtime.spawn(connection.discard());
        }
    }

    /// Orderly shutdown from CLOSING.
    fn close(&mut self) {
        if let Some(handle) = self.establisher.take() {
            self.block_on(handle.shutdown());
        }
        self.connecting = false;
        self.stop.track(None);

        if let Some(connection) = self.connection.take() {
            connection.detach();
            self.block_on(connection.shutdown());
        }
        self.connected = false;

        self.invalidate_inputs();
        self.state = DriverState::Stopped;
        info!(driver = %self.name, endpoint = %self.endpoint(), "Driver stopped");
    }

    /// Teardown after a fatal error or panic. Never blocks.
    fn force_stop(&mut self) {
        if let Some(handle) = self.establisher.take() {
            handle.abandon(&self.runtime);
        }
        self.connecting = false;
        self.stop.track(None);
        self.drop_connection();
        self.state = DriverState::Stopped;
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl Drop for CyclicDriver {
    fn drop(&mut self) {
        if let Some(handle) = self.establisher.take() {
            handle.abandon(&self.runtime);
        }
        if let Some(connection) = self.connection.take() {
            connection.detach();
            self.runtime.spawn(connection.discard());
        }
    }
}

impl fmt::Debug for CyclicDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CyclicDriver")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint())
            .field("state", &self.state)
            .field("connecting", &self.connecting)
            .field("connected", &self.connected)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
