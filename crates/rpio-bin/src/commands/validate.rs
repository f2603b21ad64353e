// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use rpio_config::RpioConfig;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(BinError::config(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = rpio_config::load_config(config_path)
        .map_err(|e| BinError::from(e).with_context("Configuration validation failed"))?;
    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Cycle:     {} ms", config.scheduler.cycle_ms);
            println!("  Endpoints: {}", config.endpoints.len());
            println!("  Drivers:   {}", config.driver_keys().len());
            println!("  Points:    {}", config.point_count());
            for key in config.driver_keys() {
                println!("    - {}", key);
            }

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", config.to_json()?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "cycle_ms": config.scheduler.cycle_ms,
                    "endpoint_count": config.endpoints.len(),
                    "driver_count": config.driver_keys().len(),
                    "point_count": config.point_count(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let rendered = serde_json::to_string_pretty(&output)?;
            println!("{}", rendered);
        }
        OutputFormat::Toml => {
            println!("valid = true");
            println!("config_path = {:?}", config_path.display().to_string());
            println!("driver_count = {}", config.driver_keys().len());
            println!("point_count = {}", config.point_count());
            println!("warnings = {:?}", warnings);
            if args.show_config {
                println!();
                println!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}

/// Returns non-fatal findings worth reporting.
fn collect_warnings(config: &RpioConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.endpoints.is_empty() {
        warnings.push("No endpoints configured".to_string());
    }
    for endpoint in &config.endpoints {
        if endpoint.points.is_empty() {
            warnings.push(format!("Endpoint '{}' has no points", endpoint.name));
        }
    }
    if let Some(interval) = config.scheduler.metrics_interval() {
        if interval < config.scheduler.cycle() {
            warnings.push("Metrics interval is shorter than one cycle".to_string());
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use rpio_config::EndpointConfig;

    use super::*;

    #[test]
    fn test_collect_warnings() {
        let mut config = RpioConfig::default();
        assert_eq!(collect_warnings(&config), vec!["No endpoints configured"]);

        config.endpoints.push(EndpointConfig::new("empty", "sim://a"));
        assert_eq!(collect_warnings(&config), vec!["Endpoint 'empty' has no points"]);
    }

    #[test]
    fn test_validate_missing_file() {
        let cli = Cli::parse_from(["rpio", "-c", "/nonexistent/rpio.yaml", "validate"]);
        let err = validate(&cli, ValidateArgs::default()).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_validate_valid_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "scheduler:\n  cycle_ms: 50\nendpoints:\n  - name: tank\n    url: sim://plant\n    points:\n      - signal: level\n        namespace: \"2\"\n        identifier: Level\n        direction: input\n"
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["rpio", "-c", path.as_str(), "validate"]);
        let args = ValidateArgs {
            show_config: true,
            format: OutputFormat::Json,
        };
        assert!(validate(&cli, args).is_ok());
    }
}
