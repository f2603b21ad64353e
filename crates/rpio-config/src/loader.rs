// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading for rpio.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension or content
//! 2. Resolve `${VAR}` and `${VAR:default}` placeholders
//! 3. Parse through the `config` crate, layering environment overrides
//! 4. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! RPIO__SCHEDULER__CYCLE_MS=50
//! RPIO__LOGGING__LEVEL=debug
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::RpioConfig;

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for rpio.
///
/// # Examples
///
/// ```no_run
/// use rpio_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("rpio.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve placeholders and apply overrides.
    resolve_env_vars: bool,

    /// Environment used instead of the process environment.
    env_source: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: "RPIO".to_string(),
            resolve_env_vars: true,
            env_source: None,
        }
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Reads variables from `source` instead of the process environment.
    pub fn with_env_source(mut self, source: HashMap<String, String>) -> Self {
        self.env_source = Some(source);
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format is taken from the extension (`.yaml`, `.yml`, `.toml`,
    /// `.json`); files without one are sniffed.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<RpioConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let content = self.read_file(path)?;
        let format = match path.extension() {
            Some(_) => ConfigFormat::from_path(path)?,
            None => ConfigFormat::sniff(&content),
        };

        let config = self
            .parse(&content, format)
            .map_err(|e| match e {
                ConfigError::Parse { message, .. } => ConfigError::parse(path, message),
                other => other,
            })?;
        config.validate()?;

        debug!(
            endpoints = config.endpoints.len(),
            drivers = config.driver_keys().len(),
            points = config.point_count(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<RpioConfig> {
        let config = self.parse(content, format)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse(&self, content: &str, format: ConfigFormat) -> ConfigResult<RpioConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)?
        } else {
            content.to_string()
        };

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(&content, format.file_format()));
        if self.resolve_env_vars {
            builder = builder.add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .separator("__")
                    .try_parsing(true)
                    .source(self.env_source.clone()),
            );
        }

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::parse("<memory>", e.to_string()))
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match &self.env_source {
            Some(source) => source.get(name).cloned(),
            None => env::var(name).ok(),
        }
    }

    /// Resolves environment variable placeholders in content.
    ///
    /// Supports `${VAR_NAME}` and `${VAR_NAME:default}`. A variable that is
    /// unset and has no default is an error.
    pub fn resolve_env_placeholders(&self, content: &str) -> ConfigResult<String> {
        let mut result = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find('}') else {
                // Unterminated: keep the remainder verbatim.
                result.push_str(&rest[start..]);
                return Ok(result);
            };

            let body = &after[..end];
            let (name, default) = match body.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (body, None),
            };

            match (self.lookup(name), default) {
                (Some(value), _) => result.push_str(&value),
                (None, Some(default)) => result.push_str(default),
                (None, None) => return Err(ConfigError::env_var_not_found(name)),
            }
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        Ok(result)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Guesses the format of `content`.
    ///
    /// A leading `{` means JSON, a `[table]` header line means TOML, anything
    /// else is read as YAML.
    pub fn sniff(content: &str) -> Self {
        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        match lines.next() {
            Some(first) if first.starts_with('{') => ConfigFormat::Json,
            Some(first) if is_toml_line(first) => ConfigFormat::Toml,
            Some(_) if lines.any(is_toml_line) => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }

    fn file_format(&self) -> config::FileFormat {
        match self {
            ConfigFormat::Yaml => config::FileFormat::Yaml,
            ConfigFormat::Toml => config::FileFormat::Toml,
            ConfigFormat::Json => config::FileFormat::Json,
        }
    }
}

fn is_toml_line(line: &str) -> bool {
    (line.starts_with('[') && line.ends_with(']') && !line.contains(','))
        || line.split_once('=').is_some_and(|(key, _)| {
            let key = key.trim();
            !key.is_empty() && !key.contains(':') && !key.contains(' ')
        })
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<RpioConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<RpioConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================
