// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The simulated endpoint.
//!
//! A [`SimEndpoint`] is a shared in-memory point table. Sessions created by
//! its [`SimSessionFactory`](crate::session::SimSessionFactory) read from and
//! write to that table; value changes are pushed synchronously, on the thread
//! that caused them, to every subscription monitoring the point.
//!
//! ## Fault injection
//!
//! - [`set_online`](SimEndpoint::set_online): an offline endpoint refuses to
//!   open and fails every request of existing sessions
//! - [`set_probe_status`](SimEndpoint::set_probe_status): status returned by probes
//! - [`set_write_status`](SimEndpoint::set_write_status): forced per-point write status
//! - [`fail_next_opens`](SimEndpoint::fail_next_opens): reject a number of opens
//! - [`fail_sessions_with`](SimEndpoint::fail_sessions_with): make session creation fail
//! - [`set_latency`](SimEndpoint::set_latency): delay before every answer

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use rpio_core::{
    DataValue, DriverError, MonitoredHandle, MonitoredItem, NotificationSink, PointId, StatusCode,
    SubscriptionId, Value, WriteItem,
};

use crate::session::SimSessionFactory;

// =============================================================================
// Internal state
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) struct SimNode {
    pub(crate) value: DataValue,
    pub(crate) writable: bool,
}

#[derive(Clone)]
pub(crate) struct SimSubscription {
    pub(crate) id: SubscriptionId,
    pub(crate) session: u64,
    pub(crate) items: Vec<MonitoredItem>,
    pub(crate) sink: Arc<dyn NotificationSink>,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) sessions_created: AtomicU64,
    pub(crate) opens: AtomicU64,
    pub(crate) closes: AtomicU64,
    pub(crate) probes: AtomicU64,
    pub(crate) reads: AtomicU64,
    pub(crate) write_batches: AtomicU64,
    pub(crate) subscribes: AtomicU64,
    pub(crate) unsubscribes: AtomicU64,
    pub(crate) notifications: AtomicU64,
}

pub(crate) struct EndpointState {
    pub(crate) url: String,
    pub(crate) nodes: DashMap<PointId, SimNode>,
    pub(crate) online: AtomicBool,
    pub(crate) probe_status: Mutex<StatusCode>,
    pub(crate) write_overrides: DashMap<PointId, StatusCode>,
    pub(crate) open_failures: AtomicU32,
    pub(crate) create_error: Mutex<Option<DriverError>>,
    pub(crate) latency: Mutex<Duration>,
    pub(crate) subscriptions: Mutex<Vec<SimSubscription>>,
    pub(crate) next_subscription: AtomicU32,
    pub(crate) next_session: AtomicU64,
    pub(crate) write_history: Mutex<Vec<WriteItem>>,
    pub(crate) counters: Counters,
}

impl EndpointState {
    fn new(url: String) -> Self {
        Self {
            url,
            nodes: DashMap::new(),
            online: AtomicBool::new(true),
            probe_status: Mutex::new(StatusCode::GOOD),
            write_overrides: DashMap::new(),
            open_failures: AtomicU32::new(0),
            create_error: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            subscriptions: Mutex::new(Vec::new()),
            next_subscription: AtomicU32::new(1),
            next_session: AtomicU64::new(1),
            write_history: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub(crate) fn latency(&self) -> Duration {
        *self.latency.lock()
    }

    /// Pushes `value` to every subscription monitoring `point_id`.
    ///
    /// Sinks are called after the subscription lock is released.
    pub(crate) fn notify(&self, point_id: &PointId, value: &DataValue) {
        let targets: Vec<(Arc<dyn NotificationSink>, MonitoredHandle)> = {
            let subscriptions = self.subscriptions.lock();
            subscriptions
                .iter()
                .flat_map(|s| {
                    s.items
                        .iter()
                        .filter(|item| &item.point_id == point_id)
                        .map(|item| (Arc::clone(&s.sink), item.handle))
                })
                .collect()
        };

        for (sink, handle) in targets {
            trace!(point = %point_id, %handle, "Pushing notification");
            sink.on_data_change(handle, value.clone());
            self.counters.notifications.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Applies one write item and returns its status.
    pub(crate) fn apply_write(&self, item: &WriteItem) -> StatusCode {
        if let Some(forced) = self.write_overrides.get(&item.point_id) {
            return *forced;
        }

        let updated = match self.nodes.get_mut(&item.point_id) {
            None => return StatusCode::BAD_NODE_ID_UNKNOWN,
            Some(node) if !node.writable => return StatusCode::BAD_NOT_WRITABLE,
            Some(mut node) => {
                node.value = DataValue::good(item.value.clone());
                node.value.clone()
            }
        };

        self.write_history.lock().push(item.clone());
        self.notify(&item.point_id, &updated);
        StatusCode::GOOD
    }

    pub(crate) fn register(&self, session: u64, items: Vec<MonitoredItem>, sink: Arc<dyn NotificationSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.lock().push(SimSubscription {
            id,
            session,
            items,
            sink,
        });
        id
    }

    pub(crate) fn drop_session_subscriptions(&self, session: u64) {
        self.subscriptions.lock().retain(|s| s.session != session);
    }
}

// =============================================================================
// SimEndpoint
// =============================================================================

/// A cloneable handle to one simulated endpoint.
#[derive(Clone)]
pub struct SimEndpoint {
    state: Arc<EndpointState>,
}

impl SimEndpoint {
    /// Creates an online endpoint with an empty point table.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: Arc::new(EndpointState::new(url.into())),
        }
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.state.url
    }

    /// Returns a session factory bound to this endpoint.
    pub fn factory(&self) -> SimSessionFactory {
        SimSessionFactory::new(Arc::clone(&self.state))
    }

    // -------------------------------------------------------------------------
    // Point table
    // -------------------------------------------------------------------------

    /// Adds a writable point with a good initial value.
    pub fn add_point(&self, point_id: PointId, initial: impl Into<Value>) {
        self.add_point_with(point_id, DataValue::good(initial), true);
    }

    /// Adds a point with an explicit data value and writability.
    pub fn add_point_with(&self, point_id: PointId, value: DataValue, writable: bool) {
        self.state.nodes.insert(point_id, SimNode { value, writable });
    }

    /// Adds a point, builder style.
    pub fn with_point(self, point_id: PointId, initial: impl Into<Value>) -> Self {
        self.add_point(point_id, initial);
        self
    }

    /// Removes a point. Later reads report `BadNodeIdUnknown`.
    pub fn remove_point(&self, point_id: &PointId) -> bool {
        self.state.nodes.remove(point_id).is_some()
    }

    /// Returns `true` if the point exists.
    pub fn has_point(&self, point_id: &PointId) -> bool {
        self.state.nodes.contains_key(point_id)
    }

    /// Returns all point identifiers.
    pub fn points(&self) -> Vec<PointId> {
        self.state.nodes.iter().map(|e| e.key().clone()).collect()
    }

    /// Returns the current data value of a point.
    pub fn value(&self, point_id: &PointId) -> Option<DataValue> {
        self.state.nodes.get(point_id).map(|node| node.value.clone())
    }

    /// Sets a good value and pushes it to subscribers.
    ///
    /// Returns `false` if the point does not exist.
    pub fn set_value(&self, point_id: &PointId, value: impl Into<Value>) -> bool {
        self.set_data_value(point_id, DataValue::good(value))
    }

    /// Sets a value with an explicit status and pushes it to subscribers.
    pub fn set_data_value(&self, point_id: &PointId, value: DataValue) -> bool {
        let updated = match self.state.nodes.get_mut(point_id) {
            Some(mut node) => {
                node.value = value;
                node.value.clone()
            }
            None => return false,
        };
        self.state.notify(point_id, &updated);
        true
    }

    /// Changes only the status of a point and pushes the change.
    pub fn set_status(&self, point_id: &PointId, status: StatusCode) -> bool {
        let updated = match self.state.nodes.get_mut(point_id) {
            Some(mut node) => {
                node.value.status = status;
                node.value.clone()
            }
            None => return false,
        };
        self.state.notify(point_id, &updated);
        true
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Takes the endpoint on- or offline.
    ///
    /// Going offline drops every subscription; open sessions fail all
    /// further requests.
    pub fn set_online(&self, online: bool) {
        let was = self.state.online.swap(online, Ordering::SeqCst);
        if was && !online {
            self.state.subscriptions.lock().clear();
            debug!(endpoint = %self.state.url, "Simulated endpoint offline");
        } else if !was && online {
            debug!(endpoint = %self.state.url, "Simulated endpoint online");
        }
    }

    /// Returns `true` if the endpoint is online.
    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    /// Sets the status reported by probes.
    pub fn set_probe_status(&self, status: StatusCode) {
        *self.state.probe_status.lock() = status;
    }

    /// Forces the write status of a point, or clears the override with `None`.
    pub fn set_write_status(&self, point_id: &PointId, status: Option<StatusCode>) {
        match status {
            Some(status) => {
                self.state.write_overrides.insert(point_id.clone(), status);
            }
            None => {
                self.state.write_overrides.remove(point_id);
            }
        }
    }

    /// Rejects the next `count` session opens.
    pub fn fail_next_opens(&self, count: u32) {
        self.state.open_failures.store(count, Ordering::SeqCst);
    }

    /// Makes session creation fail with `error`, or succeed again with `None`.
    pub fn fail_sessions_with(&self, error: Option<DriverError>) {
        *self.state.create_error.lock() = error;
    }

    /// Sets the delay applied before every answer.
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock() = latency;
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Returns the number of sessions created.
    pub fn sessions_created(&self) -> u64 {
        self.state.counters.sessions_created.load(Ordering::SeqCst)
    }

    /// Returns the number of open requests.
    pub fn opens(&self) -> u64 {
        self.state.counters.opens.load(Ordering::SeqCst)
    }

    /// Returns the number of sessions closed.
    pub fn closes(&self) -> u64 {
        self.state.counters.closes.load(Ordering::SeqCst)
    }

    /// Returns the number of probes answered.
    pub fn probes(&self) -> u64 {
        self.state.counters.probes.load(Ordering::SeqCst)
    }

    /// Returns the number of batched reads answered.
    pub fn reads(&self) -> u64 {
        self.state.counters.reads.load(Ordering::SeqCst)
    }

    /// Returns the number of batched writes answered.
    pub fn write_batches(&self) -> u64 {
        self.state.counters.write_batches.load(Ordering::SeqCst)
    }

    /// Returns the number of subscribe requests answered.
    pub fn subscribes(&self) -> u64 {
        self.state.counters.subscribes.load(Ordering::SeqCst)
    }

    /// Returns the number of unsubscribe requests answered.
    pub fn unsubscribes(&self) -> u64 {
        self.state.counters.unsubscribes.load(Ordering::SeqCst)
    }

    /// Returns the number of notifications pushed.
    pub fn notifications(&self) -> u64 {
        self.state.counters.notifications.load(Ordering::SeqCst)
    }

    /// Returns the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions.lock().len()
    }

    /// Returns the points monitored by live subscriptions.
    pub fn monitored_points(&self) -> Vec<PointId> {
        self.state
            .subscriptions
            .lock()
            .iter()
            .flat_map(|s| s.items.iter().map(|item| item.point_id.clone()))
            .collect()
    }

    /// Returns every accepted write, oldest first.
    pub fn write_history(&self) -> Vec<WriteItem> {
        self.state.write_history.lock().clone()
    }

    /// Clears the write history.
    pub fn clear_write_history(&self) {
        self.state.write_history.lock().clear();
    }
}

impl fmt::Debug for SimEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEndpoint")
            .field("url", &self.state.url)
            .field("points", &self.state.nodes.len())
            .field("online", &self.is_online())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<(MonitoredHandle, DataValue)>>);

    impl NotificationSink for Recorder {
        fn on_data_change(&self, handle: MonitoredHandle, value: DataValue) {
            self.0.lock().push((handle, value));
        }
    }

    #[test]
    fn test_set_value_notifies_subscribers() {
        let endpoint = SimEndpoint::new("sim://a").with_point(PointId::new("2", "t"), 1.0f64);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        endpoint.state.register(
            1,
            vec![MonitoredItem {
                handle: MonitoredHandle(3),
                point_id: PointId::new("2", "t"),
            }],
            recorder.clone(),
        );

        assert!(endpoint.set_value(&PointId::new("2", "t"), 2.0f64));
        assert!(!endpoint.set_value(&PointId::new("2", "missing"), 2.0f64));

        let seen = recorder.0.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (MonitoredHandle(3), DataValue::good(2.0f64)));
        assert_eq!(endpoint.notifications(), 1);
    }

    #[test]
    fn test_write_status_precedence() {
        let endpoint = SimEndpoint::new("sim://a");
        let writable = PointId::new("2", "w");
        let readonly = PointId::new("2", "r");
        endpoint.add_point(writable.clone(), 0i32);
        endpoint.add_point_with(readonly.clone(), DataValue::good(0i32), false);

        let item = |p: &PointId| WriteItem {
            point_id: p.clone(),
            value: Value::Int32(5),
        };

        assert_eq!(endpoint.state.apply_write(&item(&writable)), StatusCode::GOOD);
        assert_eq!(endpoint.state.apply_write(&item(&readonly)), StatusCode::BAD_NOT_WRITABLE);
        assert_eq!(
            endpoint.state.apply_write(&item(&PointId::new("2", "x"))),
            StatusCode::BAD_NODE_ID_UNKNOWN
        );

        endpoint.set_write_status(&writable, Some(StatusCode::BAD_TYPE_MISMATCH));
        assert_eq!(endpoint.state.apply_write(&item(&writable)), StatusCode::BAD_TYPE_MISMATCH);
        assert_eq!(endpoint.write_history().len(), 1);
        assert_eq!(endpoint.value(&writable), Some(DataValue::good(5i32)));
    }

    #[test]
    fn test_going_offline_drops_subscriptions() {
        let endpoint = SimEndpoint::new("sim://a");
        endpoint.state.register(1, Vec::new(), Arc::new(Recorder(Mutex::new(Vec::new()))));
        assert_eq!(endpoint.subscription_count(), 1);

        endpoint.set_online(false);
        assert!(!endpoint.is_online());
        assert_eq!(endpoint.subscription_count(), 0);
    }
}
