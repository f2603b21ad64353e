// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The remote session contract.
//!
//! A [`RemoteSession`] owns exactly one live session to a remote endpoint.
//! Any error leaves it unusable: callers close and discard it, then ask the
//! [`SessionFactory`] for a fresh one.
//!
//! Backends implement the raw contract. [`BoundedSession`] wraps any backend
//! and bounds every request with a timeout, mapping an elapsed timeout to a
//! retryable [`DriverError::Timeout`]. Idempotent requests (probe, batched
//! reads) are additionally retried through a [`FixedDelay`] policy.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, DriverResult};
use crate::retry::{FixedDelay, RetryConfig, RetryStrategy, duration_millis};
use crate::types::{DataValue, PointId, StatusCode, Value};

// =============================================================================
// Identifiers
// =============================================================================

/// Client-assigned handle of a monitored item.
///
/// Handles are chosen before the subscription is created, so every
/// notification can be routed as soon as it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitoredHandle(pub u32);

impl fmt::Display for MonitoredHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mi-{}", self.0)
    }
}

/// Endpoint-assigned subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u32);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One point to monitor, with its client handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredItem {
    /// Client handle echoed in every notification.
    pub handle: MonitoredHandle,
    /// The point to monitor.
    pub point_id: PointId,
}

/// Result of a successful subscribe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionGrant {
    /// The subscription identifier, used to unsubscribe.
    pub id: SubscriptionId,
    /// Per-item creation status, in request order.
    pub item_statuses: Vec<StatusCode>,
}

/// One item of a batched write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteItem {
    /// Target point.
    pub point_id: PointId,
    /// Value to write.
    pub value: Value,
}

// =============================================================================
// NotificationSink
// =============================================================================

/// Receives value-change notifications pushed by the endpoint.
///
/// Called on the endpoint's own I/O thread at an unrelated rate. Must not block.
pub trait NotificationSink: Send + Sync {
    /// Called for every value change of a monitored item.
    fn on_data_change(&self, handle: MonitoredHandle, value: DataValue);
}

// =============================================================================
// RemoteSession
// =============================================================================

/// One live session to a remote endpoint.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Returns the endpoint this session talks to.
    fn endpoint(&self) -> &str;

    /// Returns `true` once [`open`](Self::open) has succeeded and before
    /// [`close`](Self::close).
    fn is_open(&self) -> bool;

    /// Opens the session.
    async fn open(&mut self) -> DriverResult<()>;

    /// Closes the session. Idempotent, best effort, never fails.
    async fn close(&mut self);

    /// Single lightweight read testing liveness of the endpoint.
    async fn probe(&self) -> DriverResult<StatusCode>;

    /// Reads several points at once; one result per point, in request order.
    async fn read_batch(&self, points: &[PointId]) -> DriverResult<Vec<DataValue>>;

    /// Writes several points at once; one status per item, in request order.
    async fn write_batch(&self, items: &[WriteItem]) -> DriverResult<Vec<StatusCode>>;

    /// Creates one subscription covering `items`, delivering to `sink`.
    async fn subscribe(
        &self,
        items: &[MonitoredItem],
        sink: Arc<dyn NotificationSink>,
    ) -> DriverResult<SubscriptionGrant>;

    /// Deletes a subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> DriverResult<()>;
}

/// Creates sessions for one endpoint.
pub trait SessionFactory: Send + Sync {
    /// Returns the endpoint locator.
    fn endpoint(&self) -> &str;

    /// Creates a new, unopened session.
    fn create_session(&self) -> DriverResult<Box<dyn RemoteSession>>;
}

// =============================================================================
// RequestPolicy
// =============================================================================

/// Timeout and retry policy applied at the session boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPolicy {
    /// Upper bound for a single request.
    #[serde(default = "default_request_timeout", with = "duration_millis")]
    pub request_timeout: Duration,

    /// Retry policy for idempotent requests.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default()
                .with_max_attempts(2)
                .with_delay(Duration::from_millis(100)),
        }
    }
}

impl RequestPolicy {
    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

// =============================================================================
// BoundedSession
// =============================================================================

/// Applies a [`RequestPolicy`] to any session.
pub struct BoundedSession {
    inner: Box<dyn RemoteSession>,
    policy: RequestPolicy,
    retry: FixedDelay,
}

impl BoundedSession {
    /// Wraps a session.
    pub fn new(inner: Box<dyn RemoteSession>, policy: RequestPolicy) -> Self {
        let retry = FixedDelay::new(policy.retry.clone());
        Self {
            inner,
            policy,
            retry,
        }
    }

    /// Returns the policy.
    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    /// Probes once, bounded by a single request timeout.
    ///
    /// The cycle path uses this instead of [`probe`](RemoteSession::probe),
    /// which retries per the policy.
    pub async fn probe_once(&self) -> DriverResult<StatusCode> {
        with_timeout("probe", self.policy.request_timeout, self.inner.probe()).await
    }
}

/// Runs `request`, failing with [`DriverError::Timeout`] once `limit` elapses.
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, request: F) -> DriverResult<T>
where
    F: Future<Output = DriverResult<T>>,
{
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::timeout(operation, limit)),
    }
}

#[async_trait]
impl RemoteSession for BoundedSession {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn open(&mut self) -> DriverResult<()> {
        let limit = self.policy.request_timeout;
        with_timeout("open", limit, self.inner.open()).await
    }

    async fn close(&mut self) {
        let limit = self.policy.request_timeout;
        let endpoint = self.inner.endpoint().to_string();
        if tokio::time::timeout(limit, self.inner.close()).await.is_err() {
            tracing::warn!(endpoint = %endpoint, timeout_ms = limit.as_millis() as u64, "Session close timed out");
        }
    }

    async fn probe(&self) -> DriverResult<StatusCode> {
        let limit = self.policy.request_timeout;
        self.retry
            .execute(|| with_timeout("probe", limit, self.inner.probe()))
            .await
    }

    async fn read_batch(&self, points: &[PointId]) -> DriverResult<Vec<DataValue>> {
        let limit = self.policy.request_timeout;
        let results = self
            .retry
            .execute(|| with_timeout("read_batch", limit, self.inner.read_batch(points)))
            .await?;
        if results.len() != points.len() {
            return Err(DriverError::invariant(format!(
                "read_batch returned {} result(s) for {} point(s)",
                results.len(),
                points.len()
            )));
        }
        Ok(results)
    }

    async fn write_batch(&self, items: &[WriteItem]) -> DriverResult<Vec<StatusCode>> {
        let limit = self.policy.request_timeout;
        let statuses = with_timeout("write_batch", limit, self.inner.write_batch(items)).await?;
        if statuses.len() != items.len() {
            return Err(DriverError::invariant(format!(
                "write_batch returned {} status(es) for {} item(s)",
                statuses.len(),
                items.len()
            )));
        }
        Ok(statuses)
    }

    async fn subscribe(
        &self,
        items: &[MonitoredItem],
        sink: Arc<dyn NotificationSink>,
    ) -> DriverResult<SubscriptionGrant> {
        let limit = self.policy.request_timeout;
        let grant = with_timeout("subscribe", limit, self.inner.subscribe(items, sink)).await?;
        if grant.item_statuses.len() != items.len() {
            return Err(DriverError::invariant(format!(
                "subscribe returned {} status(es) for {} item(s)",
                grant.item_statuses.len(),
                items.len()
            )));
        }
        Ok(grant)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> DriverResult<()> {
        let limit = self.policy.request_timeout;
        with_timeout("unsubscribe", limit, self.inner.unsubscribe(id)).await
    }
}

impl fmt::Debug for BoundedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedSession")
            .field("endpoint", &self.inner.endpoint())
            .field("open", &self.inner.is_open())
            .field("policy", &self.policy)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    /// A session that sleeps before answering and can fail a number of probes.
    struct SlowSession {
        open: AtomicBool,
        latency: Duration,
        failing_probes: AtomicU32,
        probes: Arc<AtomicU32>,
        short_reads: bool,
    }

    impl SlowSession {
        fn new(latency: Duration) -> Self {
            Self {
                open: AtomicBool::new(false),
                latency,
                failing_probes: AtomicU32::new(0),
                probes: Arc::new(AtomicU32::new(0)),
                short_reads: false,
            }
        }
    }

    #[async_trait]
    impl RemoteSession for SlowSession {
        fn endpoint(&self) -> &str {
            "test://slow"
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn open(&mut self) -> DriverResult<()> {
            tokio::time::sleep(self.latency).await;
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) {
            self.open.store(false, Ordering::SeqCst);
        }

        async fn probe(&self) -> DriverResult<StatusCode> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            let remaining = self.failing_probes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_probes.store(remaining - 1, Ordering::SeqCst);
                return Err(DriverError::NotConnected);
            }
            Ok(StatusCode::GOOD)
        }

        async fn read_batch(&self, points: &[PointId]) -> DriverResult<Vec<DataValue>> {
            let n = if self.short_reads { points.len().saturating_sub(1) } else { points.len() };
            Ok(vec![DataValue::good(0i32); n])
        }

        async fn write_batch(&self, items: &[WriteItem]) -> DriverResult<Vec<StatusCode>> {
            Ok(vec![StatusCode::GOOD; items.len()])
        }

        async fn subscribe(
            &self,
            items: &[MonitoredItem],
            _sink: Arc<dyn NotificationSink>,
        ) -> DriverResult<SubscriptionGrant> {
            Ok(SubscriptionGrant {
                id: SubscriptionId(1),
                item_statuses: vec![StatusCode::GOOD; items.len()],
            })
        }

        async fn unsubscribe(&self, _id: SubscriptionId) -> DriverResult<()> {
            Ok(())
        }
    }

    fn policy(timeout_ms: u64, attempts: u32) -> RequestPolicy {
        RequestPolicy::default()
            .with_request_timeout(Duration::from_millis(timeout_ms))
            .with_retry(
                RetryConfig::default()
                    .with_max_attempts(attempts)
                    .with_delay(Duration::from_millis(1)),
            )
    }

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        let inner = SlowSession::new(Duration::from_millis(200));
        let mut session = BoundedSession::new(Box::new(inner), policy(20, 1));

        let err = session.open().await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout { operation: "open", .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_probe_retried_within_policy() {
        let inner = SlowSession::new(Duration::ZERO);
        inner.failing_probes.store(1, Ordering::SeqCst);
        let probes = Arc::clone(&inner.probes);

        let session = BoundedSession::new(Box::new(inner), policy(100, 2));
        assert_eq!(session.probe().await.unwrap(), StatusCode::GOOD);
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_probe_gives_up_after_max_attempts() {
        let inner = SlowSession::new(Duration::ZERO);
        inner.failing_probes.store(5, Ordering::SeqCst);
        let probes = Arc::clone(&inner.probes);

        let session = BoundedSession::new(Box::new(inner), policy(100, 3));
        assert!(matches!(session.probe().await, Err(DriverError::NotConnected)));
        assert_eq!(probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_short_read_is_invariant_violation() {
        let mut inner = SlowSession::new(Duration::ZERO);
        inner.short_reads = true;
        let session = BoundedSession::new(Box::new(inner), policy(100, 1));

        let points = vec![PointId::new("2", "a"), PointId::new("2", "b")];
        let err = session.read_batch(&points).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_single_liveness_check_not_retried() {
        let inner = SlowSession::new(Duration::ZERO);
        inner.failing_probes.store(1, Ordering::SeqCst);
        let probes = Arc::clone(&inner.probes);

        let session = BoundedSession::new(Box::new(inner), policy(100, 3));
        assert!(matches!(session.probe_once().await, Err(DriverError::NotConnected)));
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_liveness_check_bounded_by_one_timeout() {
        let inner = SlowSession::new(Duration::from_millis(500));
        let probes = Arc::clone(&inner.probes);
        let session = BoundedSession::new(Box::new(inner), policy(30, 3));

        let started = std::time::Instant::now();
        let err = session.probe_once().await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout { operation: "probe", .. }));
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_identifier_display() {
        assert_eq!(MonitoredHandle(4).to_string(), "mi-4");
        assert_eq!(SubscriptionId(9).to_string(), "sub-9");
    }
}
