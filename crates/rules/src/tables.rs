//! Keyword Rule Tables
//!
//! Every keyword heuristic in the engine is driven by one of the ordered
//! tables below. Rules are evaluated top to bottom; the first match wins
//! for single-valued lookups (severity, category, level), all matches
//! accumulate for multi-valued ones (data requirements, request scoring).
//!
//! Keywords of three characters or fewer (`io`, `db`, `api`, ...) match
//! whole words only; longer keywords match as substrings.

use ops_reasoner_core::telemetry::DataRequirement;

use crate::models::{LevelClass, LogCategory, LogSeverity, RequestType};

/// A keyword set mapped to an outcome.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule<T: 'static> {
    pub keywords: &'static [&'static str],
    pub outcome: T,
}

// ============================================================================
// Tables
// ============================================================================

/// Log level -> severity.
pub const SEVERITY_RULES: &[KeywordRule<LogSeverity>] = &[
    KeywordRule {
        keywords: &["critical", "fatal"],
        outcome: LogSeverity::High,
    },
    KeywordRule {
        keywords: &["warning", "warn"],
        outcome: LogSeverity::Medium,
    },
];

/// Log level -> counting bucket.
pub const LEVEL_RULES: &[KeywordRule<LevelClass>] = &[
    KeywordRule {
        keywords: &["critical", "fatal", "emergency", "alert", "crit", "emerg"],
        outcome: LevelClass::Critical,
    },
    KeywordRule {
        keywords: &["error", "err"],
        outcome: LevelClass::Error,
    },
    KeywordRule {
        keywords: &["warning", "warn"],
        outcome: LevelClass::Warning,
    },
];

/// Message/code text -> category.
pub const CATEGORY_RULES: &[KeywordRule<LogCategory>] = &[
    KeywordRule {
        keywords: &["auth"],
        outcome: LogCategory::Authentication,
    },
    KeywordRule {
        keywords: &["conn", "network"],
        outcome: LogCategory::Connectivity,
    },
    KeywordRule {
        keywords: &["db", "database"],
        outcome: LogCategory::Database,
    },
    KeywordRule {
        keywords: &["api"],
        outcome: LogCategory::Api,
    },
];

/// Query keywords -> data requirements for the planning fallback.
pub const REQUIREMENT_RULES: &[KeywordRule<&'static [DataRequirement]>] = &[
    KeywordRule {
        keywords: &["cpu", "processor", "load", "процессор", "нагрузка", "загрузка"],
        outcome: &[DataRequirement::CpuMetrics],
    },
    KeywordRule {
        keywords: &["memory", "ram", "swap", "память"],
        outcome: &[DataRequirement::MemoryMetrics],
    },
    KeywordRule {
        keywords: &["disk", "storage", "io", "диск", "хранилище"],
        outcome: &[DataRequirement::DiskMetrics],
    },
    KeywordRule {
        keywords: &["network", "traffic", "connection", "latency", "сеть", "трафик"],
        outcome: &[DataRequirement::NetworkMetrics],
    },
    KeywordRule {
        keywords: &["error", "log", "logs", "exception", "ошибка", "лог"],
        outcome: &[DataRequirement::ErrorLogs],
    },
    KeywordRule {
        keywords: &["performance", "slow", "производительность", "медленно"],
        outcome: &[
            DataRequirement::PerformanceLogs,
            DataRequirement::CpuMetrics,
            DataRequirement::MemoryMetrics,
        ],
    },
    KeywordRule {
        keywords: &["server", "loaded", "сервер", "загружен"],
        outcome: &[
            DataRequirement::CpuMetrics,
            DataRequirement::MemoryMetrics,
            DataRequirement::DiskMetrics,
            DataRequirement::NetworkMetrics,
        ],
    },
];

pub const MONITORING_KEYWORDS: &[&str] = &[
    "error", "errors", "bug", "bugs", "issue", "issues", "problem", "problems", "crash",
    "crashes", "fail", "failure", "down", "outage", "slow", "performance", "monitor",
    "monitoring", "status", "health", "check", "analyze", "analysis", "log", "logs", "metric",
    "metrics", "alert", "alerts", "warning", "warnings", "critical", "service", "server",
    "system", "api", "database", "db",
];

pub const QUESTION_KEYWORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "explain", "tell me", "help",
    "guide", "tutorial", "example", "show", "demonstrate",
];

pub const ANALYSIS_KEYWORDS: &[&str] = &["analyze", "analysis", "check", "review"];

// ============================================================================
// Matching
// ============================================================================

/// Whether `text` (already lowercased) contains `keyword`.
pub fn matches_keyword(text: &str, keyword: &str) -> bool {
    if keyword.chars().count() <= 3 {
        text.split(|c: char| !c.is_alphanumeric())
            .any(|token| token == keyword)
    } else {
        text.contains(keyword)
    }
}

fn matches_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| matches_keyword(text, k))
}

fn first_match<T: Copy>(text: &str, rules: &[KeywordRule<T>]) -> Option<T> {
    let lowered = text.to_lowercase();
    rules
        .iter()
        .find(|rule| matches_any(&lowered, rule.keywords))
        .map(|rule| rule.outcome)
}

// ============================================================================
// Lookups
// ============================================================================

/// Severity of a log level: critical/fatal high, warning/warn medium,
/// everything else low.
pub fn severity_for_level(level: &str) -> LogSeverity {
    first_match(level, SEVERITY_RULES).unwrap_or(LogSeverity::Low)
}

pub fn level_class(level: &str) -> LevelClass {
    first_match(level, LEVEL_RULES).unwrap_or(LevelClass::Info)
}

/// Category of a log message or error code, `General` when nothing matches.
pub fn category_for_message(message: &str) -> LogCategory {
    let lowered = message.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|rule| {
            rule.keywords.iter().any(|k| {
                // Category keywords are code fragments (CONN_REFUSED, DB_TIMEOUT),
                // so they match inside tokens as well.
                lowered.contains(k)
            })
        })
        .map(|rule| rule.outcome)
        .unwrap_or(LogCategory::General)
}

/// Data requirements inferred from a raw query. Never empty: falls back to
/// the cpu/memory baseline when no rule fires.
pub fn fallback_requirements(query: &str) -> Vec<DataRequirement> {
    let lowered = query.to_lowercase();
    let mut requirements = Vec::new();
    for rule in REQUIREMENT_RULES {
        if matches_any(&lowered, rule.keywords) {
            for requirement in rule.outcome.iter() {
                if !requirements.contains(requirement) {
                    requirements.push(*requirement);
                }
            }
        }
    }
    if requirements.is_empty() {
        requirements.extend(DataRequirement::BASELINE);
    }
    requirements
}

/// Score-based request classification.
pub fn classify_request(query: &str) -> RequestType {
    let lowered = query.to_lowercase();
    let monitoring = MONITORING_KEYWORDS
        .iter()
        .filter(|k| matches_keyword(&lowered, k))
        .count();
    let question = QUESTION_KEYWORDS
        .iter()
        .filter(|k| matches_keyword(&lowered, k))
        .count();

    if monitoring > question && monitoring > 0 {
        RequestType::Monitoring
    } else if query.contains('?') || question > 0 {
        RequestType::Question
    } else if matches_any(&lowered, ANALYSIS_KEYWORDS) {
        RequestType::Analysis
    } else {
        RequestType::Other
    }
}
