//! Evidence Formatting
//!
//! Renders collected telemetry and rule-engine results as bounded text for
//! inclusion in a prompt. Pure functions.

use std::fmt::Write;

use ops_reasoner_core::{TelemetryBundle, TelemetryRecords};
use ops_reasoner_rules::BundleAnalysis;

const SERIES_PER_CATEGORY: usize = 3;
const LOGS_PER_CATEGORY: usize = 3;
const LOG_MESSAGE_CHARS: usize = 50;
const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Render a telemetry bundle, never exceeding `max_chars` characters.
pub fn format_bundle(bundle: &TelemetryBundle, max_chars: usize) -> String {
    let mut metrics = String::new();
    let mut logs = String::new();

    for (requirement, records) in &bundle.records {
        match records {
            TelemetryRecords::Metrics(series) => {
                let _ = writeln!(metrics, "{} ({} series):", requirement, series.len());
                for s in series.iter().take(SERIES_PER_CATEGORY) {
                    match s.latest() {
                        Some(point) => {
                            let _ = writeln!(
                                metrics,
                                "  {}{{{}}}: {:.2} ({} points)",
                                s.metric,
                                s.scope,
                                point.value,
                                s.points.len()
                            );
                        }
                        None => {
                            let _ = writeln!(metrics, "  {}{{{}}}: no data", s.metric, s.scope);
                        }
                    }
                }
            }
            TelemetryRecords::Logs(records) => {
                let _ = writeln!(logs, "{} ({} records):", requirement, records.len());
                for record in records.iter().take(LOGS_PER_CATEGORY) {
                    let service = record.service.as_deref().unwrap_or("unknown");
                    let _ = writeln!(
                        logs,
                        "  [{}] {}: {}",
                        record.level,
                        service,
                        shorten(&record.message, LOG_MESSAGE_CHARS)
                    );
                }
            }
        }
    }

    let mut out = String::new();
    if !metrics.is_empty() {
        let _ = write!(out, "=== Metrics ===\n{}\n", metrics);
    }
    if !logs.is_empty() {
        let _ = write!(out, "=== Logs ===\n{}\n", logs);
    }

    let successful: Vec<String> = bundle.successful().iter().map(|r| r.to_string()).collect();
    let _ = writeln!(out, "=== Collection ===");
    let _ = writeln!(
        out,
        "successful: {}",
        if successful.is_empty() {
            "none".to_string()
        } else {
            successful.join(", ")
        }
    );
    if bundle.failures.is_empty() {
        let _ = writeln!(out, "failed: none");
    } else {
        for (requirement, error) in &bundle.failures {
            let _ = writeln!(out, "failed: {} ({})", requirement, error);
        }
    }

    truncate_to(out.trim_end(), max_chars)
}

/// Compact text view of a rule-engine bundle analysis.
pub fn format_rule_analysis(analysis: &BundleAnalysis) -> String {
    let mut out = format!(
        "Status: {} (data {}, {:.0}% collected)\n",
        analysis.status,
        analysis.data_availability,
        analysis.collection_success_rate * 100.0
    );
    if analysis.issues_summary.is_empty() {
        out.push_str("No threshold breaches or error logs found.");
    } else {
        out.push_str("Issues:\n");
        for issue in &analysis.issues_summary {
            let _ = writeln!(out, "- {}", issue);
        }
    }
    out.trim_end().to_string()
}

fn shorten(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        single_line
    } else {
        let cut: String = single_line.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Cut `text` to at most `max_chars` characters, including the marker.
fn truncate_to(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let mut cut: String = text.chars().take(max_chars - marker_len).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use ops_reasoner_core::{DataRequirement, LogRecord, MetricPoint, MetricSeries};
    use ops_reasoner_rules::RuleEngine;

    fn series(metric: &str, value: f64) -> MetricSeries {
        MetricSeries::new(
            metric,
            vec![MetricPoint {
                timestamp: 1_700_000_000_000,
                value,
            }],
        )
    }

    fn sample_bundle() -> TelemetryBundle {
        let mut bundle = TelemetryBundle::new();
        bundle.insert(
            DataRequirement::CpuMetrics,
            TelemetryRecords::Metrics(vec![
                series("system.cpu.user", 42.123),
                series("system.cpu.system", 3.0),
                series("system.cpu.idle", 54.877),
                series("system.cpu.iowait", 0.5),
            ]),
        );
        bundle.insert(
            DataRequirement::ErrorLogs,
            TelemetryRecords::Logs(vec![LogRecord::new("error", "x".repeat(80))
                .with_service("checkout")]),
        );
        bundle.insert_failure(DataRequirement::DiskMetrics, "timeout");
        bundle
    }

    #[test]
    fn test_format_bundle_sections() {
        let text = format_bundle(&sample_bundle(), 10_000);
        assert!(text.starts_with("=== Metrics ==="));
        assert!(text.contains("system.cpu.user{*}: 42.12"));
        assert!(!text.contains("system.cpu.iowait"));
        assert!(text.contains("=== Logs ==="));
        assert!(text.contains(&format!("[error] checkout: {}...", "x".repeat(50))));
        assert!(text.contains("failed: disk_metrics (timeout)"));
        assert!(text.contains("successful: cpu_metrics, error_logs"));
    }

    #[test]
    fn test_format_bundle_respects_budget() {
        let bundle = sample_bundle();
        for max in [20, 100, 200] {
            let text = format_bundle(&bundle, max);
            assert!(text.chars().count() <= max, "len {} > {}", text.len(), max);
        }
        assert!(format_bundle(&bundle, 100).ends_with("[truncated]"));
    }

    #[test]
    fn test_format_empty_bundle() {
        let text = format_bundle(&TelemetryBundle::new(), 1000);
        assert_eq!(text, "=== Collection ===\nsuccessful: none\nfailed: none");
    }

    #[test]
    fn test_truncation_on_char_boundary() {
        let text = "проверка".repeat(10);
        let cut = truncate_to(&text, 20);
        assert!(cut.chars().count() <= 20);
        assert!(cut.ends_with("[truncated]"));
    }

    #[test]
    fn test_format_rule_analysis() {
        let analysis = RuleEngine::new().analyze_bundle(&sample_bundle(), None);
        let text = format_rule_analysis(&analysis);
        assert!(text.starts_with("Status: warning (data partial, 67% collected)"));
        assert!(text.contains("Data collection failed for disk_metrics"));
    }
}
