// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # rpio-bin
//!
//! CLI binary for rpio.
//!
//! This crate provides the `rpio` executable:
//!
//! - CLI argument parsing with clap
//! - Scheduler runtime driving every configured driver
//! - Graceful shutdown handling
//! - Logging initialization
//! - Command implementations (run, validate, version)
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────┐
//!                    │   main.rs   │
//!                    └──────┬──────┘
//!                    ┌──────▼──────┐
//!                    │   cli.rs    │
//!                    └──────┬──────┘
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └──────────┘ └────┬─────┘ └──────────┘
//!                          │
//!            ┌─────────────┼─────────────┐
//!            ▼             ▼             ▼
//!     ┌────────────┐ ┌───────────┐ ┌──────────┐
//!     │ scheduler  │ │ simulated │ │ shutdown │
//!     │  thread    │ │ endpoints │ │          │
//!     └────────────┘ └───────────┘ └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the scheduler (default command)
//! rpio
//!
//! # Start with custom config, stopping after a minute
//! rpio -c /etc/rpio/plant.yaml run --duration-secs 60
//!
//! # Validate configuration
//! rpio validate --show-config
//!
//! # Show version
//! rpio version
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{Plant, RuntimeBuilder, SchedulerRuntime, SchedulerSummary};
pub use shutdown::{ShutdownCoordinator, ShutdownToken};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
