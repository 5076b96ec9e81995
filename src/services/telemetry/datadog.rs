//! Datadog Collector
//!
//! `TelemetryCollector` backed by the Datadog v1 metrics query API and the
//! v2 logs search API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use ops_reasoner_core::{
    CollectorError, DataRequirement, LogRecord, MetricPoint, MetricSeries, ProxyConfig,
    RequirementKind, TelemetryCollector, TelemetryRecords,
};
use ops_reasoner_llm::build_http_client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{log_query, metric_names};
use crate::models::settings::DatadogSettings;
use crate::services::history::BackendError;
use crate::utils::error::{AppError, AppResult};

pub struct DatadogCollector {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    app_key: String,
    lookback_minutes: u32,
    log_limit: u32,
}

impl DatadogCollector {
    /// Build a collector from settings. Missing keys are a fatal setup error.
    pub fn new(settings: &DatadogSettings, proxy: Option<&ProxyConfig>) -> AppResult<Self> {
        match (settings.api_key.as_deref(), settings.app_key.as_deref()) {
            (Some(api), Some(app)) if !api.is_empty() && !app.is_empty() => {
                Self::with_credentials(settings, api, app, proxy)
            }
            _ => Err(BackendError::MissingCredentials("datadog".to_string()).into()),
        }
    }

    /// Build a collector with keys resolved elsewhere (per-service credentials).
    pub fn with_credentials(
        settings: &DatadogSettings,
        api_key: &str,
        app_key: &str,
        proxy: Option<&ProxyConfig>,
    ) -> AppResult<Self> {
        if api_key.is_empty() || app_key.is_empty() {
            return Err(BackendError::MissingCredentials("datadog".to_string()).into());
        }
        let client = build_http_client(proxy, Duration::from_secs(settings.timeout_secs))
            .map_err(AppError::from)?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            app_key: app_key.to_string(),
            lookback_minutes: settings.lookback_minutes,
            log_limit: settings.log_limit,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, CollectorError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_transport_error)?;
        if !(200..300).contains(&status) {
            return Err(CollectorError::Api {
                status,
                message: body.chars().take(200).collect(),
            });
        }
        serde_json::from_str(&body).map_err(|e| CollectorError::Parse(e.to_string()))
    }

    /// `GET /api/v1/validate`: whether the API key is accepted.
    pub async fn validate(&self) -> Result<bool, CollectorError> {
        let url = format!("{}/api/v1/validate", self.base_url);
        let body = self.send_json(self.client.get(&url)).await?;
        Ok(body.get("valid").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn query_metric(
        &self,
        metric: &str,
        service: Option<&str>,
    ) -> Result<Vec<MetricSeries>, CollectorError> {
        let to = Utc::now().timestamp();
        let from = to - i64::from(self.lookback_minutes) * 60;
        let query = format!("avg:{}{{{}}}", metric, scope_filter(service));
        let url = format!("{}/api/v1/query", self.base_url);

        let body = self
            .send_json(self.client.get(&url).query(&[
                ("from", from.to_string()),
                ("to", to.to_string()),
                ("query", query.clone()),
            ]))
            .await?;
        let series = parse_metric_response(&body, metric)?;
        debug!("[Datadog] {} -> {} series", query, series.len());
        Ok(series)
    }

    async fn search_logs(
        &self,
        query: &str,
        service: Option<&str>,
    ) -> Result<Vec<LogRecord>, CollectorError> {
        let query = match service {
            Some(name) => format!("service:{} ({})", name, query),
            None => query.to_string(),
        };
        let url = format!("{}/api/v2/logs/events/search", self.base_url);
        let payload = serde_json::json!({
            "filter": {
                "query": query,
                "from": format!("now-{}m", self.lookback_minutes),
                "to": "now",
            },
            "page": { "limit": self.log_limit },
            "sort": "-timestamp",
        });

        let body = self
            .send_json(self.client.post(&url).json(&payload))
            .await?;
        let records = parse_log_response(&body);
        debug!("[Datadog] logs '{}' -> {} records", query, records.len());
        Ok(records)
    }

    async fn fetch_metrics(
        &self,
        requirement: DataRequirement,
        service: Option<&str>,
    ) -> Result<TelemetryRecords, CollectorError> {
        let names = metric_names(requirement);
        if names.is_empty() {
            return Err(CollectorError::Unsupported(requirement.to_string()));
        }

        let results = join_all(names.iter().map(|name| self.query_metric(name, service))).await;

        let mut series = Vec::new();
        let mut first_error = None;
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(found) => series.extend(found),
                Err(e) => {
                    warn!("[Datadog] metric {} failed: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if series.is_empty() => Err(e),
            _ => Ok(TelemetryRecords::Metrics(series)),
        }
    }
}

#[async_trait]
impl TelemetryCollector for DatadogCollector {
    fn name(&self) -> &str {
        "datadog"
    }

    async fn fetch(
        &self,
        requirement: DataRequirement,
        service_filter: Option<&str>,
    ) -> Result<TelemetryRecords, CollectorError> {
        match requirement.kind() {
            RequirementKind::Metrics => self.fetch_metrics(requirement, service_filter).await,
            RequirementKind::Logs => {
                let query = log_query(requirement)
                    .ok_or_else(|| CollectorError::Unsupported(requirement.to_string()))?;
                let records = self.search_logs(query, service_filter).await?;
                Ok(TelemetryRecords::Logs(records))
            }
        }
    }
}

fn scope_filter(service: Option<&str>) -> String {
    match service {
        Some(name) => format!("service:{}", name),
        None => "*".to_string(),
    }
}

fn map_transport_error(err: reqwest::Error) -> CollectorError {
    if err.is_timeout() {
        CollectorError::Timeout(err.to_string())
    } else {
        CollectorError::Request(err.to_string())
    }
}

/// Parse a v1 query response. Null points are skipped.
fn parse_metric_response(body: &Value, metric: &str) -> Result<Vec<MetricSeries>, CollectorError> {
    if body.get("status").and_then(|s| s.as_str()) == Some("error") {
        let message = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown error");
        return Err(CollectorError::Parse(format!("query failed: {}", message)));
    }

    let Some(items) = body.get("series").and_then(|s| s.as_array()) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let points = item
            .get("pointlist")
            .and_then(|p| p.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|pair| {
                        let pair = pair.as_array()?;
                        let timestamp = pair.first()?.as_f64()? as i64;
                        let value = pair.get(1)?.as_f64()?;
                        Some(MetricPoint { timestamp, value })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut series = MetricSeries::new(
            item.get("metric")
                .and_then(|m| m.as_str())
                .unwrap_or(metric),
            points,
        );
        if let Some(scope) = item.get("scope").and_then(|s| s.as_str()) {
            series.scope = scope.to_string();
        }
        series.unit = item
            .get("unit")
            .and_then(|u| u.as_array())
            .and_then(|units| units.first())
            .and_then(|u| u.get("short_name"))
            .and_then(|s| s.as_str())
            .map(str::to_string);
        out.push(series);
    }
    Ok(out)
}

/// Parse a v2 logs search response.
fn parse_log_response(body: &Value) -> Vec<LogRecord> {
    let Some(items) = body.get("data").and_then(|d| d.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let attrs = item.get("attributes")?;
            let text = |key: &str| attrs.get(key).and_then(|v| v.as_str()).map(str::to_string);
            Some(LogRecord {
                timestamp: text("timestamp")
                    .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                    .map(|t| t.with_timezone(&Utc)),
                level: text("status").unwrap_or_else(|| "info".to_string()),
                message: text("message").unwrap_or_default(),
                service: text("service"),
                host: text("host"),
                tags: attrs
                    .get("tags")
                    .and_then(|t| t.as_array())
                    .map(|tags| {
                        tags.iter()
                            .filter_map(|t| t.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        })
        .collect()
}
