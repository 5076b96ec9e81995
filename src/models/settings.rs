//! Settings Models
//!
//! Application configuration and settings data structures.

use std::path::PathBuf;

use ops_reasoner_core::{PipelineConfig, ProxyConfig};
use ops_reasoner_llm::ProviderConfig;
use serde::{Deserialize, Serialize};

/// Application configuration stored in config.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// LLM used by all three reasoning phases
    pub llm: ProviderConfig,
    /// Monitoring API access
    pub datadog: DatadogSettings,
    /// Chat-history backend
    pub backend: BackendSettings,
    /// Phase temperatures, confidences and size limits
    pub pipeline: PipelineConfig,
    /// Optional TOML file overriding the rule-engine thresholds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds_path: Option<PathBuf>,
    /// Proxy applied to every outbound HTTP client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

/// Monitoring API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatadogSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    /// Query window for metrics and logs
    pub lookback_minutes: u32,
    /// Maximum log events per query
    pub log_limit: u32,
    pub timeout_secs: u64,
}

impl Default for DatadogSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.datadoghq.eu".to_string(),
            api_key: None,
            app_key: None,
            lookback_minutes: 60,
            log_limit: 10,
            timeout_secs: 30,
        }
    }
}

impl DatadogSettings {
    pub fn has_credentials(&self) -> bool {
        matches!(
            (&self.api_key, &self.app_key),
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty()
        )
    }
}

/// Chat-history backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.llm.model.trim().is_empty() {
            return Err("llm.model must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(format!(
                "Invalid llm.temperature: {}. Must be between 0.0 and 2.0",
                self.llm.temperature
            ));
        }

        for (name, url) in [
            ("datadog.base_url", &self.datadog.base_url),
            ("backend.base_url", &self.backend.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("Invalid {}: {}", name, url));
            }
        }

        if self.datadog.lookback_minutes == 0 {
            return Err("datadog.lookback_minutes must be at least 1".to_string());
        }
        if self.datadog.log_limit == 0 || self.datadog.log_limit > 1000 {
            return Err("datadog.log_limit must be between 1 and 1000".to_string());
        }
        if self.datadog.timeout_secs == 0 || self.backend.timeout_secs == 0 {
            return Err("timeouts must be at least 1 second".to_string());
        }

        self.pipeline.validate().map_err(|e| e.to_string())?;

        Ok(())
    }

    /// Copy with every secret replaced by a marker, for display.
    pub fn redacted(&self) -> AppConfig {
        let mut config = self.clone();
        let mask = |secret: &mut Option<String>| {
            if secret.is_some() {
                *secret = Some("********".to_string());
            }
        };
        mask(&mut config.llm.api_key);
        mask(&mut config.datadog.api_key);
        mask(&mut config.datadog.app_key);
        if let Some(proxy) = config.proxy.as_mut() {
            mask(&mut proxy.password);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.datadog.base_url, "https://api.datadoghq.eu");
        assert_eq!(config.datadog.lookback_minutes, 60);
        assert_eq!(config.backend.base_url, "http://localhost:8080");
        assert!(!config.datadog.has_credentials());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_url() {
        let mut config = AppConfig::default();
        config.backend.base_url = "localhost:8080".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_log_limit() {
        let mut config = AppConfig::default();
        config.datadog.log_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"datadog": {"api_key": "k", "app_key": "a"}}"#).unwrap();
        assert!(config.datadog.has_credentials());
        assert_eq!(config.datadog.log_limit, 10);
        assert_eq!(config.pipeline.max_history_messages, 20);
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-live".to_string());
        config.datadog.api_key = Some("dd".to_string());
        let shown = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-live"));
        assert!(shown.contains("********"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-live"));
    }
}
