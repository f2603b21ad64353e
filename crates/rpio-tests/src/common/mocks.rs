// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Signals and session factories with scripted behavior, for the cases the
//! simulator does not cover on its own.
//!
//! - Recording of interactions for verification
//! - Thread-safe for use from driver, establisher and endpoint threads
//! - Error and panic injection

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use rpio_core::{
    DataValue, DriverResult, MonitoredItem, NotificationSink, OutputSample, PointId,
    RemoteSession, SessionFactory, Signal, StatusCode, SubscriptionGrant, SubscriptionId, Value,
    WriteItem,
};

// =============================================================================
// Recording Signal
// =============================================================================

/// One interaction of the driver with a signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    /// `check_in(value, valid)`.
    CheckIn(Value, bool),
    /// `invalidate()`.
    Invalidate,
    /// `set_write_status(status)`.
    WriteStatus(StatusCode),
}

/// A signal that records every call made on it.
#[derive(Debug)]
pub struct RecordingSignal {
    name: String,
    events: Mutex<Vec<SignalEvent>>,
    output: Mutex<Option<OutputSample>>,
}

impl RecordingSignal {
    /// Creates a signal with no pending output.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
            output: Mutex::new(None),
        })
    }

    /// Queues an output sample for the next `check_out`.
    pub fn set_output(&self, value: impl Into<Value>, valid: bool) {
        *self.output.lock() = Some(OutputSample {
            value: value.into(),
            valid,
        });
    }

    /// Returns every recorded event.
    pub fn events(&self) -> Vec<SignalEvent> {
        self.events.lock().clone()
    }

    /// Returns the number of `check_in` calls.
    pub fn check_ins(&self) -> usize {
        self.count(|e| matches!(e, SignalEvent::CheckIn(..)))
    }

    /// Returns the number of `invalidate` calls.
    pub fn invalidations(&self) -> usize {
        self.count(|e| matches!(e, SignalEvent::Invalidate))
    }

    /// Returns the last write status received.
    pub fn last_write_status(&self) -> Option<StatusCode> {
        self.events.lock().iter().rev().find_map(|e| match e {
            SignalEvent::WriteStatus(status) => Some(*status),
            _ => None,
        })
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn count(&self, filter: impl Fn(&SignalEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| filter(e)).count()
    }
}

impl Signal for RecordingSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_in(&self, value: Value, valid: bool) {
        self.events.lock().push(SignalEvent::CheckIn(value, valid));
    }

    fn check_out(&self) -> Option<OutputSample> {
        self.output.lock().take()
    }

    fn set_write_status(&self, status: StatusCode) {
        self.events.lock().push(SignalEvent::WriteStatus(status));
    }

    fn invalidate(&self) {
        self.events.lock().push(SignalEvent::Invalidate);
    }
}

// =============================================================================
// Panicking Signal
// =============================================================================

/// A signal whose `check_in` panics once armed.
#[derive(Debug)]
pub struct PanickingSignal {
    name: String,
    armed: AtomicBool,
    invalidations: AtomicU64,
}

impl PanickingSignal {
    /// Creates an armed signal.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            armed: AtomicBool::new(true),
            invalidations: AtomicU64::new(0),
        })
    }

    /// Stops panicking.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Returns the number of `invalidate` calls.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl Signal for PanickingSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_in(&self, _value: Value, _valid: bool) {
        if self.armed.load(Ordering::SeqCst) {
            panic!("signal adapter failure in '{}'", self.name);
        }
    }

    fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Tracking Factory
// =============================================================================

#[derive(Debug, Default)]
struct LiveSessions {
    live: AtomicUsize,
    max_live: AtomicUsize,
    created: AtomicU64,
}

/// Wraps a factory and tracks how many of its sessions exist at once.
pub struct TrackingFactory {
    inner: Arc<dyn SessionFactory>,
    sessions: Arc<LiveSessions>,
}

impl TrackingFactory {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn SessionFactory>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            sessions: Arc::new(LiveSessions::default()),
        })
    }

    /// Returns the number of sessions not yet dropped.
    pub fn live(&self) -> usize {
        self.sessions.live.load(Ordering::SeqCst)
    }

    /// Returns the highest number of sessions alive at the same time.
    pub fn max_live(&self) -> usize {
        self.sessions.max_live.load(Ordering::SeqCst)
    }

    /// Returns the number of sessions created.
    pub fn created(&self) -> u64 {
        self.sessions.created.load(Ordering::SeqCst)
    }
}

impl SessionFactory for TrackingFactory {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    fn create_session(&self) -> DriverResult<Box<dyn RemoteSession>> {
        let inner = self.inner.create_session()?;
        self.sessions.created.fetch_add(1, Ordering::SeqCst);
        let live = self.sessions.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.sessions.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(TrackedSession {
            inner,
            sessions: Arc::clone(&self.sessions),
        }))
    }
}

struct TrackedSession {
    inner: Box<dyn RemoteSession>,
    sessions: Arc<LiveSessions>,
}

impl Drop for TrackedSession {
    fn drop(&mut self) {
        self.sessions.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteSession for TrackedSession {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn open(&mut self) -> DriverResult<()> {
        self.inner.open().await
    }

    async fn close(&mut self) {
        self.inner.close().await
    }

    async fn probe(&self) -> DriverResult<StatusCode> {
        self.inner.probe().await
    }

    async fn read_batch(&self, points: &[PointId]) -> DriverResult<Vec<DataValue>> {
        self.inner.read_batch(points).await
    }

    async fn write_batch(&self, items: &[WriteItem]) -> DriverResult<Vec<StatusCode>> {
        self.inner.write_batch(items).await
    }

    async fn subscribe(
        &self,
        items: &[MonitoredItem],
        sink: Arc<dyn NotificationSink>,
    ) -> DriverResult<SubscriptionGrant> {
        self.inner.subscribe(items, sink).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> DriverResult<()> {
        self.inner.unsubscribe(id).await
    }
}

// =============================================================================
// Hanging Factory
// =============================================================================

/// Creates sessions whose `open` never completes.
#[derive(Debug, Default)]
pub struct HangingFactory {
    opens: Arc<AtomicU64>,
}

impl HangingFactory {
    /// Creates a new factory.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the number of `open` calls started.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl SessionFactory for HangingFactory {
    fn endpoint(&self) -> &str {
        "test://hanging"
    }

    fn create_session(&self) -> DriverResult<Box<dyn RemoteSession>> {
        Ok(Box::new(HangingSession {
            opens: Arc::clone(&self.opens),
        }))
    }
}

struct HangingSession {
    opens: Arc<AtomicU64>,
}

#[async_trait]
impl RemoteSession for HangingSession {
    fn endpoint(&self) -> &str {
        "test://hanging"
    }

    fn is_open(&self) -> bool {
        false
    }

    async fn open(&mut self) -> DriverResult<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn close(&mut self) {}

    async fn probe(&self) -> DriverResult<StatusCode> {
        std::future::pending().await
    }

    async fn read_batch(&self, _points: &[PointId]) -> DriverResult<Vec<DataValue>> {
        std::future::pending().await
    }

    async fn write_batch(&self, _items: &[WriteItem]) -> DriverResult<Vec<StatusCode>> {
        std::future::pending().await
    }

    async fn subscribe(
        &self,
        _items: &[MonitoredItem],
        _sink: Arc<dyn NotificationSink>,
    ) -> DriverResult<SubscriptionGrant> {
        std::future::pending().await
    }

    async fn unsubscribe(&self, _id: SubscriptionId) -> DriverResult<()> {
        std::future::pending().await
    }
}
