// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # rpio-config
//!
//! Configuration management for rpio.
//!
//! ## Features
//!
//! - **Schema Definition**: scheduler, logging and endpoint groups with validation
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: `${VAR:default}` placeholders and `RPIO__` variables
//!
//! ## Quick Start
//!
//! ```no_run
//! use rpio_config::loader::load_config;
//!
//! let config = load_config("rpio.yaml").unwrap();
//! println!("Drivers: {}", config.driver_keys().len());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader, load_config, load_config_str};
pub use schema::{
    EndpointConfig, InitialValue, LogFormat, LogLevel, LoggingConfig, PointConfig, RpioConfig,
    SchedulerConfig, SimulationConfig, WaveformConfig, WaveformKind,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
