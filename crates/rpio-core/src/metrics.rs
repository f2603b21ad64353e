// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-driver counters.
//!
//! Counters are plain relaxed atomics shared between the scheduler thread,
//! the establisher task and the notification thread. Read them through
//! [`DriverMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Counters for a single driver instance.
#[derive(Debug, Default)]
pub struct DriverMetrics {
    cycles: AtomicU64,
    establishments_started: AtomicU64,
    establishments_succeeded: AtomicU64,
    connect_attempts: AtomicU64,
    reconnects: AtomicU64,
    probe_failures: AtomicU64,
    notifications: AtomicU64,
    unknown_handles: AtomicU64,
    late_notifications: AtomicU64,
    write_batches: AtomicU64,
    write_items: AtomicU64,
    write_rejections: AtomicU64,
    fatal_stops: AtomicU64,
    last_connected: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl DriverMetrics {
    /// Creates zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_establishment_started(&self) {
        self.establishments_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_establishment_succeeded(&self) {
        self.establishments_succeeded.fetch_add(1, Ordering::Relaxed);
        *self.last_connected.write() = Some(Utc::now());
    }

    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_probe_failure(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown_handle(&self) {
        self.unknown_handles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_late_notification(&self) {
        self.late_notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_batch(&self, items: usize, rejected: usize) {
        self.write_batches.fetch_add(1, Ordering::Relaxed);
        self.write_items.fetch_add(items as u64, Ordering::Relaxed);
        self.write_rejections
            .fetch_add(rejected as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_fatal_stop(&self) {
        self.fatal_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self, error: &str) {
        *self.last_error.write() = Some(error.to_string());
    }

    /// Returns the number of establishment tasks started.
    pub fn establishments_started(&self) -> u64 {
        self.establishments_started.load(Ordering::Relaxed)
    }

    /// Returns the number of session open attempts made by establishers.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> DriverMetricsSnapshot {
        DriverMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            establishments_started: self.establishments_started.load(Ordering::Relaxed),
            establishments_succeeded: self.establishments_succeeded.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            unknown_handles: self.unknown_handles.load(Ordering::Relaxed),
            late_notifications: self.late_notifications.load(Ordering::Relaxed),
            write_batches: self.write_batches.load(Ordering::Relaxed),
            write_items: self.write_items.load(Ordering::Relaxed),
            write_rejections: self.write_rejections.load(Ordering::Relaxed),
            fatal_stops: self.fatal_stops.load(Ordering::Relaxed),
            last_connected: *self.last_connected.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Point-in-time copy of [`DriverMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverMetricsSnapshot {
    /// Calls to `run()`.
    pub cycles: u64,
    /// Establishment tasks started.
    pub establishments_started: u64,
    /// Establishment tasks that ended connected.
    pub establishments_succeeded: u64,
    /// Session open attempts across all establishment tasks.
    pub connect_attempts: u64,
    /// Recoverable failures that dropped the session.
    pub reconnects: u64,
    /// Probes that failed or reported a bad status.
    pub probe_failures: u64,
    /// Notifications routed into a binding.
    pub notifications: u64,
    /// Notifications with a handle that maps to no binding.
    pub unknown_handles: u64,
    /// Notifications received after their session was dropped.
    pub late_notifications: u64,
    /// Batched writes issued.
    pub write_batches: u64,
    /// Items written across all batches.
    pub write_items: u64,
    /// Items rejected with a bad status.
    pub write_rejections: u64,
    /// Transitions to STOPPED caused by fatal errors.
    pub fatal_stops: u64,
    /// Time of the last successful establishment.
    pub last_connected: Option<DateTime<Utc>>,
    /// Last recorded error.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = DriverMetrics::new();
        metrics.record_cycle();
        metrics.record_cycle();
        metrics.record_establishment_started();
        metrics.record_establishment_succeeded();
        metrics.record_write_batch(3, 1);
        metrics.record_error("probe returned bad status");

        let snap = metrics.snapshot();
        assert_eq!(snap.cycles, 2);
        assert_eq!(snap.establishments_started, 1);
        assert_eq!(snap.establishments_succeeded, 1);
        assert_eq!(snap.write_items, 3);
        assert_eq!(snap.write_rejections, 1);
        assert!(snap.last_connected.is_some());
        assert_eq!(snap.last_error.as_deref(), Some("probe returned bad status"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = DriverMetrics::new().snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["cycles"], 0);
        assert!(json["last_connected"].is_null());
    }
}
