//! Configuration loading and priority resolution
//!
//! Every setting is resolved in the same order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: it is logged and the
//! compiled defaults apply.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Environment variable prefix shared by all photosync settings
pub const ENV_PREFIX: &str = "PHOTOSYNC_";

/// Logging section of a TOML config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr when not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default TOML location for a module
///
/// Linux looks at `~/.config/photosync/<module>.toml` then
/// `/etc/photosync/<module>.toml`; other platforms use the user config dir only.
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let user_config = dirs::config_dir().map(|d| d.join("photosync").join(&file_name));

    if cfg!(target_os = "linux") {
        if let Some(path) = &user_config {
            if path.exists() {
                return Some(path.clone());
            }
        }
        let system_config = PathBuf::from("/etc/photosync").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
        return None;
    }

    user_config.filter(|p| p.exists())
}

/// Load a TOML config file, falling back to `T::default()` on any problem
///
/// # Arguments
/// * `explicit` - Path given on the command line, if any
/// * `module_name` - Module used to locate the default config file
pub fn load_toml_or_default<T>(explicit: Option<&Path>, module_name: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path(module_name) {
            Some(p) => p,
            None => {
                debug!(module = module_name, "No TOML config file found, using defaults");
                return T::default();
            }
        },
    };

    match read_toml(&path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded TOML config");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring TOML config, using defaults");
            T::default()
        }
    }
}

/// Read and parse a TOML file
pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML file, creating parent directories as needed
pub fn write_toml<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolve one setting following CLI → ENV → TOML → default
///
/// # Arguments
/// * `cli` - Value from the command line
/// * `env_var` - Environment variable name (full name, prefix included)
/// * `toml` - Value from the TOML file
/// * `default` - Compiled default
///
/// # Returns
/// The highest-priority value, or `Error::Config` when the environment
/// variable is set but does not parse.
pub fn resolve<T>(cli: Option<T>, env_var: &str, toml: Option<T>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = cli {
        return Ok(value);
    }

    if let Ok(raw) = std::env::var(env_var) {
        if !raw.trim().is_empty() {
            return raw
                .trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{}={:?}: {}", env_var, raw, e)));
        }
    }

    if let Some(value) = toml {
        return Ok(value);
    }

    Ok(default)
}

/// Environment variable name for a setting key (`concurrency` → `PHOTOSYNC_CONCURRENCY`)
pub fn env_var_name(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.to_uppercase().replace('-', "_"))
}
