//! JSON Configuration Management
//!
//! Handles reading and writing the application configuration file and
//! layering environment overrides on top of it.

use std::fs;
use std::path::{Path, PathBuf};

use ops_reasoner_core::ProxyConfig;
use tracing::debug;

use crate::models::settings::AppConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_dir};

/// Environment variables consulted after the file is loaded.
pub const ENV_OVERRIDES: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OPS_REASONER_MODEL",
    "OPS_REASONER_PROXY",
    "DD_API_KEY",
    "DD_APP_KEY",
    "DD_SITE_URL",
    "BACKEND_URL",
];

/// Configuration service for managing app settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigService {
    /// Load the config from the default location, creating defaults when
    /// absent, then apply process environment overrides.
    pub fn new() -> AppResult<Self> {
        Self::open(config_path()?)
    }

    /// Same as [`ConfigService::new`] for an explicit path.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            let default_config = AppConfig::default();
            if let Some(parent) = config_path.parent() {
                ensure_dir(parent)?;
            }
            Self::save_to_file(&config_path, &default_config)?;
            default_config
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        config.validate().map_err(AppError::validation)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<AppConfig> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        debug!("[Config] loaded {}", path.display());
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &AppConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Get a clone of the current configuration
    pub fn get_config_clone(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Override the threshold file location (CLI flag).
    pub fn set_thresholds_path(&mut self, path: PathBuf) {
        self.config.thresholds_path = Some(path);
    }
}

/// Apply environment overrides. `lookup` returns the value for a key;
/// empty values are treated as unset.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = get("OPENAI_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Some(url) = get("OPENAI_BASE_URL") {
        config.llm.base_url = Some(url);
    }
    if let Some(model) = get("OPS_REASONER_MODEL") {
        config.llm.model = model;
    }
    if let Some(raw) = get("OPS_REASONER_PROXY") {
        let proxy = ProxyConfig::from_url(&raw)?;
        config.llm.proxy = Some(proxy.clone());
        config.proxy = Some(proxy);
    }
    if let Some(key) = get("DD_API_KEY") {
        config.datadog.api_key = Some(key);
    }
    if let Some(key) = get("DD_APP_KEY") {
        config.datadog.app_key = Some(key);
    }
    if let Some(url) = get("DD_SITE_URL") {
        config.datadog.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(url) = get("BACKEND_URL") {
        config.backend.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_config_file(content: &str) -> (NamedTempFile, PathBuf) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let path = file.path().to_path_buf();
        (file, path)
    }

    #[test]
    fn test_load_config_from_file() {
        let (_file, path) = create_test_config_file(r#"{"llm": {"provider": "openai", "model": "gpt-4o-mini"}}"#);
        let config = ConfigService::load_from_file(&path).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.datadog.lookback_minutes, 60);
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let (_file, path) =
            create_test_config_file(r#"{"datadog": {"base_url": "ftp://nowhere"}}"#);
        let result = ConfigService::load_from_file(&path);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_save_config_to_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let config = AppConfig::default();

        ConfigService::save_to_file(&path, &config).unwrap();

        assert!(path.exists());
        let loaded = ConfigService::load_from_file(&path).unwrap();
        assert_eq!(loaded.backend.base_url, config.backend.base_url);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OPS_REASONER_MODEL", "gpt-4o-mini"),
            ("DD_API_KEY", "dd-api"),
            ("DD_APP_KEY", "dd-app"),
            ("DD_SITE_URL", "https://api.datadoghq.com/"),
            ("BACKEND_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(config.datadog.has_credentials());
        assert_eq!(config.datadog.base_url, "https://api.datadoghq.com");
        // empty values do not override
        assert_eq!(config.backend.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_env_proxy_override() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |k| {
            (k == "OPS_REASONER_PROXY").then(|| "socks5://127.0.0.1:1080".to_string())
        })
        .unwrap();
        assert_eq!(config.proxy.as_ref().map(|p| p.port), Some(1080));
        assert!(config.llm.proxy.is_some());

        let mut config = AppConfig::default();
        let bad = apply_env_overrides(&mut config, |k| {
            (k == "OPS_REASONER_PROXY").then(|| "no-scheme".to_string())
        });
        assert!(matches!(bad, Err(AppError::Core(_))));
    }
}
