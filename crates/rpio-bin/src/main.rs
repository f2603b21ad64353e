// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! rpio - cyclic remote point I/O
//!
//! Main binary entry point.

use rpio_bin::cli::{Cli, Commands};
use rpio_bin::error::report_error_and_exit;
use rpio_bin::{commands, init_logging};
use rpio_config::LoggingConfig;

fn main() {
    let cli = Cli::parse_args();

    // Logging settings come from the config file when it loads; the command
    // itself reports load failures once logging is up.
    let logging = match cli.effective_command() {
        Commands::Version => LoggingConfig::default(),
        _ => rpio_config::load_config(&cli.config)
            .map(|config| config.logging)
            .unwrap_or_default(),
    };

    let level = cli.effective_log_level(logging.level.as_str());
    if let Err(e) = init_logging(level, cli.effective_log_format(logging.format)) {
        report_error_and_exit(e);
    }

    if let Err(e) = commands::execute(cli) {
        report_error_and_exit(e);
    }
}
