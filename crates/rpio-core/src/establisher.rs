// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Background connection establishment.
//!
//! A [`ConnectionEstablisher`] runs on the tokio runtime, off the scheduler
//! thread, and loops until connected, cancelled or fatally failed:
//!
//! 1. create and open a session if none exists
//! 2. probe liveness; a bad status keeps the session and tries again later
//! 3. read every registered point once and record its availability
//! 4. subscribe all available inputs through one [`SubscriptionFeed`]
//! 5. hand the [`Connection`] back over a oneshot channel
//!
//! Any error in steps 1-4 discards the session and starts over after the
//! reconnect delay, unless it is fatal. Cancellation is checked between
//! attempts and interrupts the delay, never an attempt in progress.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, error, info, warn};

use crate::binding::PointBinding;
use crate::error::{DriverError, DriverResult};
use crate::metrics::DriverMetrics;
use crate::session::{BoundedSession, NotificationSink, RemoteSession, SessionFactory};
use crate::settings::DriverSettings;
use crate::subscription::{ActiveSubscription, FeedBuilder};
use crate::types::{PointId, StatusCode};

// =============================================================================
// CancelToken
// =============================================================================

/// Termination flag shared between the driver and its establisher.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // A stored permit wakes a waiter that has not started waiting yet.
        self.notify.notify_one();
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An established session and its subscription.
#[derive(Debug)]
pub struct Connection {
    /// The open session.
    pub session: BoundedSession,
    /// The subscription covering all available inputs, if any.
    pub subscription: Option<ActiveSubscription>,
    /// Number of registered points found unavailable.
    pub unavailable_points: usize,
}

impl Connection {
    /// Stops routing notifications into bindings.
    pub fn detach(&self) {
        if let Some(subscription) = &self.subscription {
            subscription.feed.detach();
        }
    }

    /// Orderly teardown: deletes the subscription, then closes the session.
    ///
    /// Errors are logged and swallowed.
    pub async fn shutdown(mut self) {
        self.detach();
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = self.session.unsubscribe(subscription.id).await {
                warn!(
                    endpoint = %self.session.endpoint(),
                    subscription = %subscription.id,
                    error = %e,
                    "Failed to delete subscription"
                );
            }
        }
        self.session.close().await;
    }

    /// Teardown of a session already considered broken: no unsubscribe.
    pub async fn discard(mut self) {
        self.detach();
        self.session.close().await;
    }
}

/// Final result of an establishment task.
#[derive(Debug)]
pub enum EstablishOutcome {
    /// Connected; the driver adopts the connection.
    Connected(Connection),
    /// Cancelled by a shutdown request.
    Cancelled,
    /// Fatal error; the driver must stop.
    Failed(DriverError),
}

enum Step {
    Connected(Option<ActiveSubscription>, usize),
    NotReady(StatusCode),
}

// =============================================================================
// ConnectionEstablisher
// =============================================================================

/// Performs the open, probe, resolve, subscribe handshake with retries.
pub struct ConnectionEstablisher {
    driver: String,
    factory: Arc<dyn SessionFactory>,
    bindings: Arc<[Arc<PointBinding>]>,
    settings: DriverSettings,
    metrics: Arc<DriverMetrics>,
    cancel: CancelToken,
}

impl ConnectionEstablisher {
    /// Creates an establisher for the given bindings.
    pub fn new(
        driver: impl Into<String>,
        factory: Arc<dyn SessionFactory>,
        bindings: Arc<[Arc<PointBinding>]>,
        settings: DriverSettings,
        metrics: Arc<DriverMetrics>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            driver: driver.into(),
            factory,
            bindings,
            settings,
            metrics,
            cancel,
        }
    }

    /// Spawns the establisher on `runtime`.
    pub fn spawn(self, runtime: &Handle) -> EstablishHandle {
        let (sender, receiver) = oneshot::channel();
        let cancel = self.cancel.clone();

        runtime.spawn(async move {
            let outcome = self.run().await;
            if let Err(EstablishOutcome::Connected(connection)) = sender.send(outcome) {
                // Nobody is waiting any more; do not leak the session.
                connection.shutdown().await;
            }
        });

        EstablishHandle { receiver, cancel }
    }

    /// Runs the establishment loop to completion.
    pub async fn run(self) -> EstablishOutcome {
        for binding in self.bindings.iter() {
            binding.reset_for_attempt();
        }

        let endpoint = self.factory.endpoint().to_string();
        let delay = self.settings.reconnect_delay;
        let mut session: Option<BoundedSession> = None;
        let mut attempt = 0u32;
        let mut fault_logged = false;

        loop {
            if self.cancel.is_cancelled() {
                close_session(&mut session).await;
                debug!(driver = %self.driver, endpoint = %endpoint, "Connection establishment cancelled");
                return EstablishOutcome::Cancelled;
            }

            attempt += 1;
            match self.attempt(&mut session).await {
                Ok(Step::Connected(subscription, unavailable_points)) => {
                    let Some(session) = session.take() else {
                        return EstablishOutcome::Failed(DriverError::invariant(
                            "attempt succeeded without a session",
                        ));
                    };
                    let connection = Connection {
                        session,
                        subscription,
                        unavailable_points,
                    };

                    if self.cancel.is_cancelled() {
                        connection.shutdown().await;
                        return EstablishOutcome::Cancelled;
                    }

                    self.metrics.record_establishment_succeeded();
                    info!(
                        driver = %self.driver,
                        endpoint = %endpoint,
                        attempts = attempt,
                        monitored = connection.subscription.as_ref().map_or(0, |s| s.feed.len()),
                        unavailable = unavailable_points,
                        "Connection established"
                    );
                    return EstablishOutcome::Connected(connection);
                }
                Ok(Step::NotReady(status)) => {
                    debug!(
                        driver = %self.driver,
                        endpoint = %endpoint,
                        attempt,
                        status = %status,
                        "Endpoint not ready"
                    );
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        driver = %self.driver,
                        endpoint = %endpoint,
                        error = %e,
                        "Connection establishment failed fatally"
                    );
                    close_session(&mut session).await;
                    return EstablishOutcome::Failed(e);
                }
                Err(e) => {
                    if !fault_logged {
                        warn!(
                            driver = %self.driver,
                            endpoint = %endpoint,
                            error = %e,
                            retry_ms = delay.as_millis() as u64,
                            "Connection attempt failed; retrying"
                        );
                        fault_logged = true;
                    } else {
                        debug!(
                            driver = %self.driver,
                            endpoint = %endpoint,
                            attempt,
                            error = %e,
                            "Connection attempt failed"
                        );
                    }
                    self.metrics.record_error(&e.to_string());
                    close_session(&mut session).await;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, slot: &mut Option<BoundedSession>) -> DriverResult<Step> {
        if slot.is_none() {
            self.metrics.record_connect_attempt();
            let inner = self.factory.create_session()?;
            let mut session = BoundedSession::new(inner, self.settings.request.clone());
            if let Err(e) = session.open().await {
                session.close().await;
                return Err(e.with_endpoint(self.factory.endpoint()));
            }
            *slot = Some(session);
        }
        let Some(session) = slot.as_ref() else {
            return Err(DriverError::invariant("session slot empty after open"));
        };

        let status = session.probe().await?;
        if status.is_bad() {
            return Ok(Step::NotReady(status));
        }

        let unavailable_points = self.resolve_availability(session).await?;

        let mut builder = FeedBuilder::new(Arc::clone(&self.metrics));
        for binding in self.bindings.iter() {
            if binding.direction().is_input() && binding.is_available() {
                builder.bind(Arc::clone(binding));
            }
        }
        if builder.is_empty() {
            return Ok(Step::Connected(None, unavailable_points));
        }

        let (feed, items) = builder.build();
        let sink: Arc<dyn NotificationSink> = feed.clone();
        let grant = match session.subscribe(&items, sink).await {
            Ok(grant) => grant,
            Err(e) => {
                feed.detach();
                return Err(e);
            }
        };

        let mut unavailable_points = unavailable_points;
        for (item, status) in items.iter().zip(&grant.item_statuses) {
            if status.is_good() {
                continue;
            }
            if let Some(binding) = feed.binding(item.handle) {
                if status.is_bad() {
                    binding.set_available(false);
                    unavailable_points += 1;
                }
                warn!(
                    driver = %self.driver,
                    signal = %binding.name(),
                    point = %item.point_id,
                    status = %status,
                    "Monitored item not created cleanly"
                );
            }
        }

        Ok(Step::Connected(
            Some(ActiveSubscription {
                id: grant.id,
                feed,
            }),
            unavailable_points,
        ))
    }

    /// Reads every registered point once and records its availability.
    async fn resolve_availability(&self, session: &BoundedSession) -> DriverResult<usize> {
        if self.bindings.is_empty() {
            return Ok(0);
        }

        let points: Vec<PointId> = self
            .bindings
            .iter()
            .map(|binding| binding.point_id().clone())
            .collect();
        let results = session.read_batch(&points).await?;

        let mut unavailable = 0;
        for (binding, result) in self.bindings.iter().zip(&results) {
            let available = !result.status.is_bad();
            binding.set_available(available);
            if !available {
                unavailable += 1;
                warn!(
                    driver = %self.driver,
                    signal = %binding.name(),
                    point = %binding.point_id(),
                    status = %result.status,
                    "Point unavailable for this connection"
                );
            }
        }
        Ok(unavailable)
    }
}

impl fmt::Debug for ConnectionEstablisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEstablisher")
            .field("driver", &self.driver)
            .field("endpoint", &self.factory.endpoint())
            .field("bindings", &self.bindings.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

async fn close_session(slot: &mut Option<BoundedSession>) {
    if let Some(mut session) = slot.take() {
        session.close().await;
    }
}

// =============================================================================
// EstablishHandle
// =============================================================================

/// The driver's side of a running establisher.
///
/// Dropping the handle cancels the task but loses an outcome already sent;
/// use [`shutdown`](Self::shutdown) or [`abandon`](Self::abandon) so that a
/// delivered connection is torn down.
#[derive(Debug)]
pub struct EstablishHandle {
    receiver: oneshot::Receiver<EstablishOutcome>,
    cancel: CancelToken,
}

impl EstablishHandle {
    /// Polls for the outcome without blocking.
    pub fn try_outcome(&mut self) -> Option<EstablishOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(EstablishOutcome::Failed(
                DriverError::invariant("establisher task ended without reporting an outcome"),
            )),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the task and waits for its outcome.
    ///
    /// A connection delivered before the cancellation was seen is shut down.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Ok(EstablishOutcome::Connected(connection)) = (&mut self.receiver).await {
            debug!(endpoint = %connection.session.endpoint(), "Shutting down unadopted connection");
            connection.shutdown().await;
        }
    }

    /// Runs [`shutdown`](Self::shutdown) in the background on `runtime`.
    pub fn abandon(self, runtime: &Handle) {
        runtime.spawn(self.shutdown());
    }
}

impl Drop for EstablishHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancel_token_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_before_wait() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already cancelled");
        assert!(token.is_cancelled());
    }
}
