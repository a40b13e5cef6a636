//! Configuration file management
//!
//! Config directory: ~/.kafka-reassign/ (cross-platform)
//!
//! Config file format (~/.kafka-reassign/config.toml):
//! ```toml
//! time_limit_secs = 300
//! min_factor = 0.9
//! max_factor = 1.1
//! leader_strategy = "preserve"
//! ```

use anyhow::{Context, Result};
use reassign_core::OptimizerConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Get the config directory path (~/.kafka-reassign/)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".kafka-reassign"))
}

/// Get the default config file path
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Resolve the config file in effect: an explicit path, or the default
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config_file_path(),
    }
}

/// Load configuration: defaults, then the file, then `REASSIGN_*` variables.
///
/// A missing default file is not an error; a missing explicit file is.
pub fn load_config(explicit: Option<&Path>) -> Result<OptimizerConfig> {
    let config = match explicit {
        Some(path) => OptimizerConfig::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => match config_file_path() {
            Ok(path) if path.exists() => OptimizerConfig::from_file(&path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            _ => OptimizerConfig::default(),
        },
    };
    let config = config
        .with_env()
        .context("Invalid REASSIGN_* environment variable")?;
    debug!(?config, "Configuration loaded");
    Ok(config)
}

/// Save configuration, creating the parent directory if needed
pub fn save_config(config: &OptimizerConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
    }
    let content = config.to_toml_string().context("Failed to serialize config")?;
    fs::write(path, content).context("Failed to write config file")?;
    Ok(())
}
