// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sessions against a [`SimEndpoint`](crate::SimEndpoint).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tracing::debug;

use rpio_core::{
    DataValue, DriverError, DriverResult, MonitoredItem, NotificationSink, PointId, RemoteSession,
    SessionFactory, StatusCode, SubscriptionGrant, SubscriptionId, WriteItem,
};

use crate::endpoint::EndpointState;

// =============================================================================
// SimSessionFactory
// =============================================================================

/// Creates [`SimSession`]s for one simulated endpoint.
#[derive(Clone)]
pub struct SimSessionFactory {
    state: Arc<EndpointState>,
}

impl SimSessionFactory {
    pub(crate) fn new(state: Arc<EndpointState>) -> Self {
        Self { state }
    }
}

impl SessionFactory for SimSessionFactory {
    fn endpoint(&self) -> &str {
        &self.state.url
    }

    fn create_session(&self) -> DriverResult<Box<dyn RemoteSession>> {
        if let Some(error) = self.state.create_error.lock().as_ref() {
            return Err(error.clone());
        }
        let id = self.state.next_session.fetch_add(1, Ordering::SeqCst);
        self.state.counters.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimSession {
            state: Arc::clone(&self.state),
            id,
            open: false,
        }))
    }
}

impl fmt::Debug for SimSessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimSessionFactory")
            .field("endpoint", &self.state.url)
            .finish()
    }
}

// =============================================================================
// SimSession
// =============================================================================

/// One session against a simulated endpoint.
///
/// Dropping the session removes its subscriptions.
pub struct SimSession {
    state: Arc<EndpointState>,
    id: u64,
    open: bool,
}

impl SimSession {
    /// Returns the session number, unique per endpoint.
    pub fn id(&self) -> u64 {
        self.id
    }

    async fn answer(&self) -> DriverResult<()> {
        if !self.open {
            return Err(DriverError::NotConnected);
        }
        let latency = self.state.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !self.state.is_online() {
            return Err(DriverError::connection_failed(format!(
                "{} went offline",
                self.state.url
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for SimSession {
    fn endpoint(&self) -> &str {
        &self.state.url
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> DriverResult<()> {
        self.state.counters.opens.fetch_add(1, Ordering::SeqCst);
        let latency = self.state.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.state.is_online() {
            return Err(DriverError::connection_failed(format!(
                "{} unreachable",
                self.state.url
            )));
        }
        let rejected = self
            .state
            .open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(DriverError::connection_failed("session activation rejected"));
        }

        self.open = true;
        debug!(endpoint = %self.state.url, session = self.id, "Simulated session opened");
        Ok(())
    }

    async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.state.drop_session_subscriptions(self.id);
        self.state.counters.closes.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %self.state.url, session = self.id, "Simulated session closed");
    }

    async fn probe(&self) -> DriverResult<StatusCode> {
        self.answer().await?;
        self.state.counters.probes.fetch_add(1, Ordering::SeqCst);
        Ok(*self.state.probe_status.lock())
    }

    async fn read_batch(&self, points: &[PointId]) -> DriverResult<Vec<DataValue>> {
        self.answer().await?;
        self.state.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(points
            .iter()
            .map(|point| match self.state.nodes.get(point) {
                Some(node) => node.value.clone(),
                None => DataValue::status_only(StatusCode::BAD_NODE_ID_UNKNOWN),
            })
            .collect())
    }

    async fn write_batch(&self, items: &[WriteItem]) -> DriverResult<Vec<StatusCode>> {
        self.answer().await?;
        self.state.counters.write_batches.fetch_add(1, Ordering::SeqCst);
        Ok(items.iter().map(|item| self.state.apply_write(item)).collect())
    }

    async fn subscribe(
        &self,
        items: &[MonitoredItem],
        sink: Arc<dyn NotificationSink>,
    ) -> DriverResult<SubscriptionGrant> {
        self.answer().await?;
        self.state.counters.subscribes.fetch_add(1, Ordering::SeqCst);

        let mut statuses = Vec::with_capacity(items.len());
        let mut monitored = Vec::new();
        for item in items {
            if self.state.nodes.contains_key(&item.point_id) {
                statuses.push(StatusCode::GOOD);
                monitored.push(item.clone());
            } else {
                statuses.push(StatusCode::BAD_NODE_ID_UNKNOWN);
            }
        }

        let id = self.state.register(self.id, monitored.clone(), Arc::clone(&sink));

        // Initial values, as a real server sends right after item creation.
        for item in &monitored {
            let current = self.state.nodes.get(&item.point_id).map(|node| node.value.clone());
            if let Some(value) = current {
                sink.on_data_change(item.handle, value);
                self.state.counters.notifications.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(SubscriptionGrant {
            id,
            item_statuses: statuses,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> DriverResult<()> {
        self.answer().await?;
        let mut subscriptions = self.state.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| !(s.id == id && s.session == self.id));
        if subscriptions.len() == before {
            return Err(DriverError::subscription(format!("unknown subscription {}", id)));
        }
        self.state.counters.unsubscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for SimSession {
    fn drop(&mut self) {
        self.state.drop_session_subscriptions(self.id);
    }
}

impl fmt::Debug for SimSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimSession")
            .field("endpoint", &self.state.url)
            .field("id", &self.id)
            .field("open", &self.open)
            .finish()
    }
}
