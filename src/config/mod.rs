//! Application configuration.
//!
//! Settings come from an optional `config.toml` (path overridable through
//! `CONFIG_PATH`), then environment variables override the database section.
//! Every field has a default so an empty or missing file is valid.

/// Database connection settings and schema bootstrap
pub mod database;

/// Payroll scheduler and retry timings
pub mod payroll;

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

pub use database::DatabaseConfig;
pub use payroll::PayrollConfig;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `[database]` section
    pub database: DatabaseConfig,
    /// `[payroll]` section
    pub payroll: PayrollConfig,
}

/// Loads configuration from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    parse_config(&contents)
}

/// Parses configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config: {e}"),
    })
}

/// Loads the configuration the binary runs with.
///
/// Uses `CONFIG_PATH` if set (the file must exist), otherwise `./config.toml`
/// when present, otherwise defaults. Environment overrides are applied last.
pub fn load_app_configuration() -> Result<AppConfig> {
    let mut config = match std::env::var("CONFIG_PATH") {
        Ok(path) => load_config(path)?,
        Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH)?,
        Err(_) => {
            tracing::info!("No config file found, using defaults");
            AppConfig::default()
        }
    };
    config.database.apply_env_overrides();
    Ok(config)
}
