//! Configuration file discovery and loading
//!
//! Resolution order for the configuration file:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/vfp/config.toml`, then
//!    `/etc/vfp/config.toml` on Linux)
//! 4. No file: callers fall back to built-in defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "VFP_CONFIG";

/// Application directory name under the platform config directory
const APP_DIR: &str = "vfp";

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Resolve which configuration file to load.
///
/// Explicit sources (CLI argument, environment variable) are returned even
/// when the file does not exist, so that loading reports a clear error
/// instead of silently using defaults. Platform locations are only returned
/// when present on disk.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config locations
    default_config_path()
}

/// Platform configuration file, if one exists
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and deserialize a TOML configuration file
pub fn read_config_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str::<T>(&content)?;
    debug!("Loaded configuration from {}", path.display());
    Ok(value)
}

/// Resolve and load configuration, falling back to `T::default()` when no
/// file is configured or found.
pub fn load_or_default<T: DeserializeOwned + Default>(
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Result<T> {
    match resolve_config_path(cli_arg, env_var_name) {
        Some(path) => read_config_file(&path),
        None => {
            debug!("No configuration file found, using built-in defaults");
            Ok(T::default())
        }
    }
}
