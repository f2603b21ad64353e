// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # rpio Integration Tests
//!
//! Integration tests for the rpio workspace, run against the in-memory
//! simulated endpoint of `rpio-sim`.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Point layouts, settings and configuration documents
//!   - `mocks`: Signals and session factories with scripted behavior
//!   - `harness`: A driver, its signals and an owned runtime
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p rpio-tests
//!
//! # Run specific test suite
//! cargo test -p rpio-tests --test integration_driver
//! cargo test -p rpio-tests --test integration_establisher
//! cargo test -p rpio-tests --test integration_config
//! ```
//!
//! ## Test Categories
//!
//! ### Driver Tests (`integration_driver.rs`)
//! - Cycle semantics of inputs and outputs
//! - Reconnection after probe and write failures
//! - Availability and the unavailable-point policy
//! - Shutdown, fatal errors and panics
//!
//! ### Establisher Tests (`integration_establisher.rs`)
//! - Handshake outcomes and retries
//! - Cancellation
//! - Registry deduplication
//!
//! ### Config Tests (`integration_config.rs`)
//! - Loading files in every supported format
//! - Environment overrides and validation
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use rpio_tests::prelude::*;
//!
//! #[test]
//! fn test_something() {
//!     let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
//!     assert!(harness.run_until_transceiving());
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
}
