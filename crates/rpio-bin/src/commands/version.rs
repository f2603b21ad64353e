// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::BinResult;

/// Executes the `version` command to display version information.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("rpio - cyclic remote point I/O");
    println!();
    println!("Version Information:");
    println!("  rpio-bin:    {}", env!("CARGO_PKG_VERSION"));
    println!("  rpio-core:   {}", rpio_core::VERSION);
    println!("  rpio-config: {}", rpio_config::VERSION);
    println!("  rpio-sim:    {}", rpio_sim::VERSION);
    println!();
    println!("Build Information:");
    println!("  Rust Edition: 2024");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
