//! Cross-Platform Path Utilities
//!
//! Resolves the configuration directory (`<config dir>/ops-reasoner/`).

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

const APP_DIR: &str = "ops-reasoner";

/// Get the platform configuration directory
pub fn config_root() -> AppResult<PathBuf> {
    dirs::config_dir().ok_or_else(|| AppError::config("Could not determine config directory"))
}

/// Get the application directory (`<config dir>/ops-reasoner/`)
pub fn app_dir() -> AppResult<PathBuf> {
    Ok(config_root()?.join(APP_DIR))
}

/// Get the config file path (`<config dir>/ops-reasoner/config.json`)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(app_dir()?.join("config.json"))
}

/// Default location of the threshold override file
pub fn thresholds_path() -> AppResult<PathBuf> {
    Ok(app_dir()?.join("thresholds.toml"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
