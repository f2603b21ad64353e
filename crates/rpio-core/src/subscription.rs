// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Routing of pushed notifications into point bindings.
//!
//! A [`SubscriptionFeed`] is built before the subscribe request: each
//! available input binding gets a client handle, so the handle table is
//! complete and immutable by the time the first notification arrives. The
//! feed is then handed to the session as its [`NotificationSink`].
//!
//! When the owning session is dropped the feed is detached; notifications
//! still in flight on the endpoint's thread are counted and discarded. Each
//! route remembers the binding's epoch at build time and detaching retires
//! it, so a notification that passed the attached check just before a detach
//! is refused by the binding itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::binding::PointBinding;
use crate::metrics::DriverMetrics;
use crate::session::{MonitoredHandle, MonitoredItem, NotificationSink, SubscriptionId};
use crate::types::DataValue;

// =============================================================================
// FeedBuilder
// =============================================================================

#[derive(Debug)]
struct Route {
    binding: Arc<PointBinding>,
    epoch: u64,
}

/// Assigns handles and collects the monitored-item list.
pub struct FeedBuilder {
    routes: HashMap<MonitoredHandle, Route>,
    items: Vec<MonitoredItem>,
    next_handle: u32,
    metrics: Arc<DriverMetrics>,
}

impl FeedBuilder {
    /// Creates an empty builder.
    pub fn new(metrics: Arc<DriverMetrics>) -> Self {
        Self {
            routes: HashMap::new(),
            items: Vec::new(),
            next_handle: 1,
            metrics,
        }
    }

    /// Adds a binding under the next free handle.
    pub fn bind(&mut self, binding: Arc<PointBinding>) -> MonitoredHandle {
        let handle = MonitoredHandle(self.next_handle);
        self.next_handle += 1;
        self.items.push(MonitoredItem {
            handle,
            point_id: binding.point_id().clone(),
        });
        let epoch = binding.epoch();
        self.routes.insert(handle, Route { binding, epoch });
        handle
    }

    /// Returns `true` if nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finishes the builder, returning the feed and the items to subscribe.
    pub fn build(self) -> (Arc<SubscriptionFeed>, Vec<MonitoredItem>) {
        let feed = Arc::new(SubscriptionFeed {
            routes: self.routes,
            attached: AtomicBool::new(true),
            metrics: self.metrics,
        });
        (feed, self.items)
    }
}

// =============================================================================
// SubscriptionFeed
// =============================================================================

/// Handle-to-binding routing table acting as a notification sink.
pub struct SubscriptionFeed {
    routes: HashMap<MonitoredHandle, Route>,
    attached: AtomicBool,
    metrics: Arc<DriverMetrics>,
}

impl SubscriptionFeed {
    /// Returns the binding routed under `handle`.
    pub fn binding(&self, handle: MonitoredHandle) -> Option<&Arc<PointBinding>> {
        self.routes.get(&handle).map(|route| &route.binding)
    }

    /// Returns the number of routed handles.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no handle is routed.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Stops routing. Later notifications are discarded.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
        for route in self.routes.values() {
            route.binding.retire(route.epoch);
        }
    }

    /// Returns `true` until [`detach`](Self::detach) is called.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

impl NotificationSink for SubscriptionFeed {
    fn on_data_change(&self, handle: MonitoredHandle, value: DataValue) {
        if !self.is_attached() {
            self.metrics.record_late_notification();
            return;
        }

        match self.routes.get(&handle) {
            Some(Route { binding, epoch }) if binding.is_available() => {
                if binding.deliver(*epoch, value) {
                    self.metrics.record_notification();
                } else {
                    self.metrics.record_late_notification();
                }
            }
            Some(Route { binding, .. }) => {
                tracing::trace!(%handle, signal = %binding.name(), "Notification for unavailable point ignored");
            }
            None => {
                self.metrics.record_unknown_handle();
                tracing::debug!(%handle, "Notification for unknown handle");
            }
        }
    }
}

impl fmt::Debug for SubscriptionFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionFeed")
            .field("routes", &self.routes.len())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// A live subscription: the endpoint's identifier plus its routing feed.
#[derive(Debug, Clone)]
pub struct ActiveSubscription {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// The feed receiving its notifications.
    pub feed: Arc<SubscriptionFeed>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalCell;
    use crate::types::{Direction, PointDescriptor, PointId, StatusCode};

    fn input(name: &str) -> Arc<PointBinding> {
        let binding = PointBinding::new(
            PointDescriptor::new(PointId::new("2", name), Direction::Input),
            Arc::new(SignalCell::new(name)),
        );
        binding.set_available(true);
        Arc::new(binding)
    }

    #[test]
    fn test_routes_to_bound_binding() {
        let metrics = Arc::new(DriverMetrics::new());
        let a = input("a");
        let b = input("b");

        let mut builder = FeedBuilder::new(Arc::clone(&metrics));
        let ha = builder.bind(Arc::clone(&a));
        let hb = builder.bind(Arc::clone(&b));
        assert_ne!(ha, hb);

        let (feed, items) = builder.build();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].point_id, PointId::new("2", "a"));

        feed.on_data_change(hb, DataValue::good(2i32));
        assert!(a.take_update().is_none());
        assert_eq!(b.take_update(), Some(DataValue::good(2i32)));
        assert_eq!(metrics.snapshot().notifications, 1);
    }

    #[test]
    fn test_unknown_handle_counted() {
        let metrics = Arc::new(DriverMetrics::new());
        let mut builder = FeedBuilder::new(Arc::clone(&metrics));
        builder.bind(input("a"));
        let (feed, _) = builder.build();

        feed.on_data_change(MonitoredHandle(99), DataValue::good(1i32));
        assert_eq!(metrics.snapshot().unknown_handles, 1);
    }

    #[test]
    fn test_detached_feed_discards() {
        let metrics = Arc::new(DriverMetrics::new());
        let a = input("a");
        let mut builder = FeedBuilder::new(Arc::clone(&metrics));
        let handle = builder.bind(Arc::clone(&a));
        let (feed, _) = builder.build();

        feed.detach();
        feed.on_data_change(handle, DataValue::status_only(StatusCode::BAD));
        assert!(!a.has_update());
        assert_eq!(metrics.snapshot().late_notifications, 1);
    }

    #[test]
    fn test_unavailable_binding_ignored() {
        let metrics = Arc::new(DriverMetrics::new());
        let a = input("a");
        let mut builder = FeedBuilder::new(Arc::clone(&metrics));
        let handle = builder.bind(Arc::clone(&a));
        let (feed, _) = builder.build();

        a.set_available(false);
        feed.on_data_change(handle, DataValue::good(1i32));
        assert!(!a.has_update());
    }

    #[test]
    fn test_retired_feed_cannot_fill_next_connection() {
        let metrics = Arc::new(DriverMetrics::new());
        let a = input("a");

        let mut old = FeedBuilder::new(Arc::clone(&metrics));
        let old_handle = old.bind(Arc::clone(&a));
        let (old_feed, _) = old.build();

        // The next attempt resets the binding and subscribes a fresh feed.
        a.reset_for_attempt();
        a.set_available(true);
        let mut next = FeedBuilder::new(Arc::clone(&metrics));
        let next_handle = next.bind(Arc::clone(&a));
        let (next_feed, _) = next.build();

        // The old feed was never detached, so only the epoch stops it.
        assert!(old_feed.is_attached());
        old_feed.on_data_change(old_handle, DataValue::good(1i32));
        assert!(!a.has_update());
        assert_eq!(metrics.snapshot().late_notifications, 1);

        next_feed.on_data_change(next_handle, DataValue::good(2i32));
        assert_eq!(a.take_update(), Some(DataValue::good(2i32)));
    }

    #[test]
    fn test_detach_fences_binding() {
        let metrics = Arc::new(DriverMetrics::new());
        let a = input("a");
        let mut builder = FeedBuilder::new(Arc::clone(&metrics));
        builder.bind(Arc::clone(&a));
        let (feed, _) = builder.build();

        let epoch = a.epoch();
        feed.detach();
        // A delivery that raced past the attached check is still refused.
        assert!(!a.deliver(epoch, DataValue::good(1i32)));
        assert!(!a.has_update());
    }
}
