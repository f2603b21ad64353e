// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # rpio-sim
//!
//! In-memory simulated endpoint implementing the `rpio-core` session
//! contract. It stands in for a real protocol backend in tests and in the
//! `rpio` runner.
//!
//! ```rust,ignore
//! use rpio_sim::SimEndpoint;
//!
//! let endpoint = SimEndpoint::new("sim://plant")
//!     .with_point(PointId::new("2", "Tank.Level"), 0.0f64);
//! let factory = Arc::new(endpoint.factory());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod endpoint;
pub mod publisher;
pub mod session;
pub mod waveform;

pub use endpoint::SimEndpoint;
pub use publisher::WaveformPublisher;
pub use session::{SimSession, SimSessionFactory};
pub use waveform::{Waveform, conform};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
