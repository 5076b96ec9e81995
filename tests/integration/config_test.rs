//! Configuration Integration Tests

use std::fs;

use ops_reasoner::storage::config::{apply_env_overrides, ConfigService};
use ops_reasoner::{AppConfig, AppError};

#[test]
fn test_open_creates_default_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let service = ConfigService::open(&path).unwrap();
    assert!(path.exists());
    assert_eq!(service.config_path(), path.as_path());
    assert_eq!(service.get_config().pipeline.max_context_chars, 4000);

    let written: AppConfig = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written.datadog.lookback_minutes, 60);
    assert!(written.pipeline.concurrent_collection);
}

#[test]
fn test_open_reads_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"pipeline": {"max_history_messages": 5, "concurrent_collection": false},
            "datadog": {"log_limit": 250}}"#,
    )
    .unwrap();

    let service = ConfigService::open(&path).unwrap();
    let config = service.get_config();
    assert_eq!(config.pipeline.max_history_messages, 5);
    assert!(!config.pipeline.concurrent_collection);
    assert_eq!(config.pipeline.parsed_confidence, 0.8);
    assert_eq!(config.datadog.log_limit, 250);
}

#[test]
fn test_open_rejects_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"backend": {"base_url": "ftp://history"}}"#).unwrap();

    let err = ConfigService::open(&path).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn test_env_overrides_layer_over_file() {
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config, |key| match key {
        "DD_API_KEY" => Some("api-from-env".to_string()),
        "DD_APP_KEY" => Some("app-from-env".to_string()),
        "BACKEND_URL" => Some("https://history.internal/".to_string()),
        "OPENAI_API_KEY" => Some("   ".to_string()),
        _ => None,
    })
    .unwrap();

    assert!(config.datadog.has_credentials());
    assert_eq!(config.backend.base_url, "https://history.internal");
    assert_eq!(config.llm.api_key, None);

    let shown = serde_json::to_string(&config.redacted()).unwrap();
    assert!(!shown.contains("api-from-env"));
}
