//! Rule Engine
//!
//! Deterministic analysis of collected telemetry against static threshold
//! tables. Every method is a pure function of its input and the engine's
//! (immutable) threshold table, so the same bundle always yields the same
//! issues and recommendations.

use std::collections::BTreeMap;
use std::path::Path;

use ops_reasoner_core::error::{CoreError, CoreResult};
use ops_reasoner_core::telemetry::{LogRecord, TelemetryBundle};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{
    BundleAnalysis, ErrorThresholds, HealthStatus, IssueSeverity, LevelClass, LogAnalysis,
    LogIssue, MetricAnalysis, MetricIssue, MetricSnapshot, RecommendationSet, ServiceRule,
    ThresholdRule,
};
use crate::tables::{category_for_message, level_class, severity_for_level};

/// Cap on recommendations and immediate actions produced by log analysis.
const MAX_LOG_ADVICE: usize = 10;
/// Issues expanded into individual investigation steps in an action plan.
const MAX_PLANNED_ISSUES: usize = 5;
const MAX_ISSUE_MESSAGE_CHARS: usize = 120;
/// Datadog HTTP check response time, in seconds.
const HTTP_RESPONSE_TIME: &str = "network.http.response_time";

// ============================================================================
// Threshold table
// ============================================================================

/// All static thresholds consulted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    /// Global per-metric warning/critical bounds
    pub performance: BTreeMap<String, ThresholdRule>,
    pub errors: ErrorThresholds,
    /// Additional per-service limits
    pub services: BTreeMap<String, ServiceRule>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let mut performance = BTreeMap::new();
        performance.insert(
            "cpu_usage".to_string(),
            ThresholdRule::new(80.0, 90.0).with_recommendations(&[
                "Identify CPU-heavy processes and optimize hot paths",
                "Consider scaling out or adding CPU capacity",
            ]),
        );
        performance.insert(
            "memory_usage".to_string(),
            ThresholdRule::new(85.0, 95.0).with_recommendations(&[
                "Check for memory leaks in long-running processes",
                "Review memory limits and consider increasing available RAM",
            ]),
        );
        performance.insert(
            "disk_usage".to_string(),
            ThresholdRule::new(90.0, 95.0).with_recommendations(&[
                "Clean up old logs and temporary files",
                "Expand disk capacity or archive cold data",
            ]),
        );
        performance.insert(
            "network_latency".to_string(),
            ThresholdRule::new(1000.0, 2000.0).with_recommendations(&[
                "Check network paths between services",
                "Review connection pooling and timeout settings",
            ]),
        );
        performance.insert(
            "error_rate".to_string(),
            ThresholdRule::new(5.0, 10.0).with_recommendations(&[
                "Investigate the sources of failing requests",
                "Review recent deployments for regressions",
            ]),
        );

        Self {
            performance,
            errors: ErrorThresholds::default(),
            services: BTreeMap::new(),
        }
    }
}

/// Partial threshold rule as written in an override file.
#[derive(Debug, Default, Deserialize)]
struct RuleOverride {
    warning: Option<f64>,
    critical: Option<f64>,
    recommendations: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorOverride {
    critical_error_count: Option<usize>,
    response_time_ms: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TableOverride {
    #[serde(default)]
    performance: BTreeMap<String, RuleOverride>,
    #[serde(default)]
    errors: ErrorOverride,
    #[serde(default)]
    services: BTreeMap<String, ServiceRule>,
}

impl ThresholdTable {
    /// Defaults overlaid with a TOML document. Keys missing from the
    /// document keep their default values.
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let overrides: TableOverride = toml::from_str(content)
            .map_err(|e| CoreError::parse(format!("invalid threshold file: {}", e)))?;

        let mut table = Self::default();
        for (metric, rule) in overrides.performance {
            let entry = table
                .performance
                .entry(metric.clone())
                .or_insert_with(|| ThresholdRule::new(f64::MAX, f64::MAX));
            if let Some(warning) = rule.warning {
                entry.warning = warning;
            }
            if let Some(critical) = rule.critical {
                entry.critical = critical;
            }
            if let Some(recommendations) = rule.recommendations {
                entry.recommendations = recommendations;
            }
            debug!(
                "[Rules] threshold override {}: warning={} critical={}",
                metric, entry.warning, entry.critical
            );
        }
        if let Some(count) = overrides.errors.critical_error_count {
            table.errors.critical_error_count = count;
        }
        if let Some(ms) = overrides.errors.response_time_ms {
            table.errors.response_time_ms = ms;
        }
        table.services.extend(overrides.services);

        table.validate()?;
        Ok(table)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> CoreResult<()> {
        for (metric, rule) in &self.performance {
            if rule.warning > rule.critical {
                return Err(CoreError::validation(format!(
                    "threshold for {}: warning ({}) exceeds critical ({})",
                    metric, rule.warning, rule.critical
                )));
            }
        }
        if self.errors.critical_error_count == 0 {
            return Err(CoreError::validation(
                "critical_error_count must be at least 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Static rule analyzer. Cheap to clone; holds no mutable state.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    thresholds: ThresholdTable,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: ThresholdTable) -> Self {
        Self { thresholds }
    }

    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        Ok(Self::with_thresholds(ThresholdTable::from_file(path)?))
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Classify every metric in the snapshot against the global table, then
    /// apply service limits on top.
    pub fn analyze_metrics(&self, snapshot: &MetricSnapshot) -> MetricAnalysis {
        let mut analysis = MetricAnalysis::healthy(snapshot.service.clone());

        for (metric, value) in &snapshot.values {
            let Some(rule) = self.thresholds.performance.get(metric) else {
                continue;
            };
            let Some(severity) = rule.classify(*value) else {
                continue;
            };
            let threshold = match severity {
                IssueSeverity::Critical => rule.critical,
                IssueSeverity::Warning => rule.warning,
            };
            analysis.issues.push(MetricIssue {
                metric: metric.clone(),
                value: *value,
                threshold,
                severity,
                message: format!(
                    "{} is {:.1}, at or above the {} threshold of {}",
                    metric, value, severity, threshold
                ),
            });
            for recommendation in &rule.recommendations {
                push_unique(&mut analysis.recommendations, recommendation);
            }
        }

        if let Some(service) = snapshot.service.as_deref() {
            if let Some(limits) = self.thresholds.services.get(service) {
                self.check_service_limits(service, limits, snapshot, &mut analysis);
            }
        }
        self.check_response_time(snapshot, &mut analysis);

        analysis.status = status_for_issues(&analysis.issues);
        analysis
    }

    /// Global response-time ceiling, skipped when a service limit already
    /// flagged the same metric.
    fn check_response_time(&self, snapshot: &MetricSnapshot, analysis: &mut MetricAnalysis) {
        let limit = self.thresholds.errors.response_time_ms;
        let Some(value) = snapshot.values.get("response_time_avg").copied() else {
            return;
        };
        let already_flagged = analysis
            .issues
            .iter()
            .any(|issue| issue.metric == "response_time_avg");
        if value <= limit || already_flagged {
            return;
        }
        analysis.issues.push(MetricIssue {
            metric: "response_time_avg".to_string(),
            value,
            threshold: limit,
            severity: IssueSeverity::Warning,
            message: format!(
                "response_time_avg is {:.1}ms, above the response-time limit of {}ms",
                value, limit
            ),
        });
        push_unique(
            &mut analysis.recommendations,
            "Profile slow endpoints and review downstream dependencies",
        );
    }

    fn check_service_limits(
        &self,
        service: &str,
        limits: &ServiceRule,
        snapshot: &MetricSnapshot,
        analysis: &mut MetricAnalysis,
    ) {
        let checks = [
            (
                "requests_per_second",
                limits.max_requests_per_second,
                "Consider rate limiting or scaling out the service",
            ),
            (
                "response_time_avg",
                limits.max_response_time_ms,
                "Profile slow endpoints and review downstream dependencies",
            ),
        ];

        for (metric, limit, recommendation) in checks {
            let (Some(limit), Some(value)) = (limit, snapshot.values.get(metric)) else {
                continue;
            };
            if *value > limit {
                analysis.issues.push(MetricIssue {
                    metric: metric.to_string(),
                    value: *value,
                    threshold: limit,
                    severity: IssueSeverity::Warning,
                    message: format!(
                        "{} for {} is {:.1}, above the service limit of {}",
                        metric, service, value, limit
                    ),
                });
                push_unique(&mut analysis.recommendations, recommendation);
            }
        }
    }

    /// Reduce the collected metric series to one value per normalized
    /// metric name, using the latest point of each series.
    ///
    /// `network_latency` comes from the HTTP check response time or any
    /// series named `*latency*`; `error_rate` is errors over hits of the
    /// APM request metrics. Series already named after a rule key are used
    /// as-is.
    pub fn snapshot_from_bundle(
        &self,
        bundle: &TelemetryBundle,
        service: Option<&str>,
    ) -> MetricSnapshot {
        let mut latest: BTreeMap<&str, f64> = BTreeMap::new();
        for (_, series) in bundle.metric_series() {
            if let Some(point) = series.latest() {
                let slot = latest.entry(series.metric.as_str()).or_insert(point.value);
                if point.value > *slot {
                    *slot = point.value;
                }
            }
        }

        let mut snapshot = match service {
            Some(name) => MetricSnapshot::for_service(name),
            None => MetricSnapshot::new(),
        };

        let user = latest.get("system.cpu.user").copied();
        let system = latest.get("system.cpu.system").copied();
        if user.is_some() || system.is_some() {
            let cpu = user.unwrap_or(0.0) + system.unwrap_or(0.0);
            snapshot.values.insert("cpu_usage".to_string(), cpu);
        } else if let Some(idle) = latest.get("system.cpu.idle") {
            snapshot
                .values
                .insert("cpu_usage".to_string(), (100.0 - idle).max(0.0));
        }

        if let Some(pct) = used_percent(&latest, "system.mem.used", "system.mem.free") {
            snapshot.values.insert("memory_usage".to_string(), pct);
        }

        if let Some(in_use) = latest.get("system.disk.in_use") {
            snapshot
                .values
                .insert("disk_usage".to_string(), in_use * 100.0);
        } else if let Some(pct) = used_percent(&latest, "system.disk.used", "system.disk.free") {
            snapshot.values.insert("disk_usage".to_string(), pct);
        }

        let latency = latest
            .iter()
            .filter_map(|(name, value)| latency_ms(name, *value))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        if let Some(latency) = latency {
            snapshot
                .values
                .insert("network_latency".to_string(), latency);
        }

        let hits = latest.get("trace.http.request.hits").copied();
        let errors = latest.get("trace.http.request.errors").copied();
        if let (Some(hits), Some(errors)) = (hits, errors) {
            if hits > 0.0 {
                snapshot
                    .values
                    .insert("error_rate".to_string(), errors / hits * 100.0);
            }
        }

        // Series already named after a rule key pass straight through.
        for (name, value) in &latest {
            let known = self.thresholds.performance.contains_key(*name)
                || matches!(*name, "requests_per_second" | "response_time_avg");
            if known {
                snapshot.values.entry(name.to_string()).or_insert(*value);
            }
        }

        if let Some(seconds) = latest.get(HTTP_RESPONSE_TIME) {
            snapshot
                .values
                .entry("response_time_avg".to_string())
                .or_insert(seconds * 1000.0);
        }

        snapshot
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// Count, classify and advise on a batch of log records.
    pub fn analyze_logs<'a, I>(&self, service: &str, logs: I) -> LogAnalysis
    where
        I: IntoIterator<Item = &'a LogRecord>,
    {
        let mut analysis = LogAnalysis::empty();

        for record in logs {
            analysis.total_logs += 1;
            let class = level_class(&record.level);
            match class {
                LevelClass::Critical => analysis.critical_count += 1,
                LevelClass::Error => analysis.error_count += 1,
                LevelClass::Warning => analysis.warning_count += 1,
                LevelClass::Info => continue,
            }

            let record_service = record.service.as_deref().unwrap_or(service);
            if matches!(class, LevelClass::Critical | LevelClass::Error) {
                analysis.issues.push(LogIssue {
                    service: record_service.to_string(),
                    level: record.level.clone(),
                    severity: severity_for_level(&record.level),
                    category: category_for_message(&record.message),
                    message: truncate_chars(&record.message, MAX_ISSUE_MESSAGE_CHARS),
                });
                for recommendation in recommendations_for_log(record_service, &record.level) {
                    push_capped(&mut analysis.recommendations, &recommendation, MAX_LOG_ADVICE);
                }
            }
            for action in immediate_actions(&record.level) {
                push_capped(&mut analysis.immediate_actions, action, MAX_LOG_ADVICE);
            }
        }

        analysis.status = if analysis.critical_count > 0
            || analysis.error_count >= self.thresholds.errors.critical_error_count
        {
            HealthStatus::Critical
        } else if analysis.error_count > 0 || analysis.warning_count > 0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        analysis
    }

    // ------------------------------------------------------------------
    // Bundles
    // ------------------------------------------------------------------

    /// Combined metric, log and collection-coverage analysis of a bundle.
    pub fn analyze_bundle(
        &self,
        bundle: &TelemetryBundle,
        service: Option<&str>,
    ) -> BundleAnalysis {
        let snapshot = self.snapshot_from_bundle(bundle, service);
        let metrics = self.analyze_metrics(&snapshot);
        let logs = self.analyze_logs(
            service.unwrap_or("system"),
            bundle.log_records().into_iter().map(|(_, record)| record),
        );

        let requested = bundle.requested_count();
        let successful = bundle.records.len();
        let collection_success_rate = if requested == 0 {
            1.0
        } else {
            successful as f64 / requested as f64
        };
        let collection_status = if requested > 0 && successful == 0 {
            HealthStatus::Critical
        } else if !bundle.failures.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let status = metrics.status.worst(logs.status).worst(collection_status);

        let mut issues_summary = Vec::new();
        for issue in &metrics.issues {
            issues_summary.push(format!("[{}] {}", issue.severity, issue.message));
        }
        for issue in &logs.issues {
            issues_summary.push(format!(
                "[{}] {} issue in {}: {}",
                issue.severity, issue.category, issue.service, issue.message
            ));
        }
        for (requirement, error) in &bundle.failures {
            issues_summary.push(format!("Data collection failed for {}: {}", requirement, error));
        }

        let mut recommendations = Vec::new();
        let mut immediate_actions = Vec::new();
        if !bundle.failures.is_empty() {
            push_unique(&mut recommendations, "Restore access to unavailable data sources");
            push_unique(&mut immediate_actions, "Check the monitoring system status");
            if successful == 0 {
                push_unique(&mut recommendations, "Check connectivity to data sources");
                push_unique(&mut recommendations, "Verify monitoring API credentials");
            }
        }
        for recommendation in metrics.recommendations.iter().chain(&logs.recommendations) {
            push_unique(&mut recommendations, recommendation);
        }
        if metrics.status == HealthStatus::Critical {
            push_unique(&mut immediate_actions, "Investigate critical resource usage");
        }
        for action in &logs.immediate_actions {
            push_unique(&mut immediate_actions, action);
        }

        debug!(
            "[Rules] bundle analysis: status={} issues={} success_rate={:.2}",
            status,
            issues_summary.len(),
            collection_success_rate
        );

        BundleAnalysis {
            status,
            metrics,
            logs,
            collection_success_rate,
            data_availability: if bundle.failures.is_empty() {
                "complete".to_string()
            } else {
                "partial".to_string()
            },
            issues_summary,
            recommendations,
            immediate_actions,
            requires_immediate_attention: status == HealthStatus::Critical,
        }
    }

    /// Final advice for a bundle plus the issues accumulated so far.
    pub fn generate_recommendations(
        &self,
        bundle: &TelemetryBundle,
        service: Option<&str>,
        issues: &[String],
    ) -> RecommendationSet {
        let analysis = self.analyze_bundle(bundle, service);
        self.recommendations_from_analysis(&analysis, issues)
    }

    pub fn recommendations_from_analysis(
        &self,
        analysis: &BundleAnalysis,
        issues: &[String],
    ) -> RecommendationSet {
        let mut recommendations = analysis.recommendations.clone();
        for generic in generic_recommendations(analysis.status) {
            push_unique(&mut recommendations, generic);
        }

        let mut action_plan = Vec::new();
        for action in &analysis.immediate_actions {
            push_unique(&mut action_plan, action);
        }
        for issue in issues.iter().take(MAX_PLANNED_ISSUES) {
            push_unique(&mut action_plan, &format!("Investigate: {}", issue));
        }
        push_unique(&mut action_plan, "Verify resolution and continue monitoring");

        RecommendationSet {
            status: analysis.status,
            priority: analysis.status.priority().to_string(),
            recommendations,
            action_plan,
            estimated_resolution_time: estimate_resolution_time(analysis.status).to_string(),
            requires_escalation: analysis.status == HealthStatus::Critical,
        }
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Advice templates for one log record, parameterized by service and level.
pub fn recommendations_for_log(service: &str, level: &str) -> Vec<String> {
    let mut out = vec![
        format!("Review {} service logs for additional context", service),
        "Check service health and resource utilization".to_string(),
        "Verify service configuration and dependencies".to_string(),
    ];
    if matches!(level_class(level), LevelClass::Critical | LevelClass::Error) {
        out.push("Consider implementing retry mechanisms".to_string());
        out.push("Set up monitoring and alerting for this error type".to_string());
        out.push("Review error handling in the application code".to_string());
    }
    out
}

pub fn immediate_actions(level: &str) -> &'static [&'static str] {
    match level_class(level) {
        LevelClass::Critical => &[
            "Notify the on-call team immediately",
            "Check service availability",
            "Prepare a recovery plan",
        ],
        LevelClass::Error => &[
            "Analyze the error details",
            "Check service logs",
            "Monitor for recurrences",
        ],
        LevelClass::Warning | LevelClass::Info => {
            &["Record the event in the monitoring system", "Check trends"]
        }
    }
}

pub fn estimate_resolution_time(status: HealthStatus) -> &'static str {
    status.estimated_resolution_time()
}

pub fn generic_recommendations(status: HealthStatus) -> &'static [&'static str] {
    match status {
        HealthStatus::Critical => &[
            "Immediate investigation required",
            "Check system resources and logs",
            "Consider scaling or failover procedures",
            "Alert operations team",
        ],
        HealthStatus::Warning => &[
            "Monitor system closely",
            "Review recent changes",
            "Check resource utilization trends",
            "Plan preventive maintenance",
        ],
        HealthStatus::Healthy => &[
            "Continue regular monitoring",
            "Review system performance metrics",
            "Update documentation if needed",
        ],
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn status_for_issues(issues: &[MetricIssue]) -> HealthStatus {
    if issues.iter().any(|i| i.severity == IssueSeverity::Critical) {
        HealthStatus::Critical
    } else if issues.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Warning
    }
}

/// Latency in milliseconds for series that measure it.
fn latency_ms(name: &str, value: f64) -> Option<f64> {
    if name == HTTP_RESPONSE_TIME {
        Some(value * 1000.0)
    } else if name.contains("latency") {
        Some(value)
    } else {
        None
    }
}

fn used_percent(latest: &BTreeMap<&str, f64>, used: &str, free: &str) -> Option<f64> {
    let used = *latest.get(used)?;
    let free = *latest.get(free)?;
    let total = used + free;
    (total > 0.0).then(|| used / total * 100.0)
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    let item = item.trim();
    if !item.is_empty() && !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

fn push_capped(list: &mut Vec<String>, item: &str, cap: usize) {
    if list.len() < cap {
        push_unique(list, item);
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}
