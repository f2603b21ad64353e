// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # rpio-core
//!
//! Cyclic remote-point I/O driver core.
//!
//! A [`CyclicDriver`] connects one addressing scope of a remote endpoint to a
//! set of local signals. An external scheduler calls
//! [`run`](CyclicDriver::run) once per cycle; the driver never blocks the
//! cycle on connection establishment and keeps reconnecting after transient
//! failures.
//!
//! - **Session**: the [`RemoteSession`] contract plus [`BoundedSession`]
//! - **Establisher**: background open, probe, resolve and subscribe
//! - **Subscription**: routing of pushed notifications into bindings
//! - **Binding**: per-point mailbox and output slot
//! - **Driver**: the per-cycle state machine
//!
//! ## Example
//!
//! ```rust,ignore
//! use rpio_core::{CyclicDriver, DriverSettings, StaticResolver};
//!
//! let mut driver = CyclicDriver::new("plc", factory, DriverSettings::default(), handle);
//! driver.prepare(signals, &resolver)?;
//! loop {
//!     driver.run();
//!     std::thread::sleep(cycle);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod address;
pub mod error;
pub mod types;
pub mod signal;

// =============================================================================
// Session Modules
// =============================================================================

pub mod retry;
pub mod session;
pub mod settings;

// =============================================================================
// Driver Modules
// =============================================================================

pub mod binding;
pub mod subscription;
pub mod establisher;
pub mod driver;
pub mod metrics;
pub mod registry;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use address::{AddressResolver, StaticResolver};
pub use error::{DriverError, DriverResult};
pub use types::*;
pub use signal::{OutputSample, Signal, SignalCell};

pub use retry::{FixedDelay, NoRetry, RetryConfig, RetryStrategy};
pub use session::{
    BoundedSession, MonitoredHandle, MonitoredItem, NotificationSink, RemoteSession,
    RequestPolicy, SessionFactory, SubscriptionGrant, SubscriptionId, WriteItem,
};
pub use settings::{DriverSettings, UnavailablePolicy};

pub use binding::PointBinding;
pub use subscription::{ActiveSubscription, FeedBuilder, SubscriptionFeed};
pub use establisher::{CancelToken, Connection, ConnectionEstablisher, EstablishHandle, EstablishOutcome};
pub use driver::{CyclicDriver, StopHandle};
pub use metrics::{DriverMetrics, DriverMetricsSnapshot};
pub use registry::DriverRegistry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
