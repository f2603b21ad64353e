// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use std::time::Duration;

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Executes the `run` command to start the scheduler.
pub fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    info!(config = %cli.config.display(), "Starting rpio...");

    let runtime = RuntimeBuilder::new()
        .config_path(&cli.config)
        .cycle_ms(args.cycle_ms)
        .duration(args.duration_secs.map(Duration::from_secs))
        .build()?;

    runtime.run()
}
