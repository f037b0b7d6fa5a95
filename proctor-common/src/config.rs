//! Configuration file resolution
//!
//! Config file lookup follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`~/.config/proctor/config.toml`)
//! 4. System config file (`/etc/proctor/config.toml`)
//!
//! A missing file is never fatal: callers fall back to compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PROCTOR_CONFIG";

/// Locate the config file to load, if any
///
/// An explicit path (CLI or env) is returned even if it does not exist so
/// the caller can report it; implicit locations are only returned when
/// present.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_locations()
        .into_iter()
        .find(|candidate| candidate.exists())
}

/// Platform config locations, most specific first
pub fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("proctor").join("config.toml"));
    }
    if cfg!(unix) {
        locations.push(PathBuf::from("/etc/proctor/config.toml"));
    }
    locations
}

/// Default SQLite database location for the platform
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("proctor").join("proctor.db"))
        .unwrap_or_else(|| PathBuf::from("./proctor_data/proctor.db"))
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Load the resolved config file, or `T::default()` when there is none
///
/// Read or parse failures of an existing file are errors; a missing file
/// only logs a warning.
pub fn load_or_default<T>(cli_arg: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml(&path)
        }
        Some(path) => {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(T::default())
        }
        None => {
            info!("No config file found, using defaults");
            Ok(T::default())
        }
    }
}
