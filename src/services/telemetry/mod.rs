//! Telemetry Collection
//!
//! Maps the data-requirement vocabulary onto monitoring queries and hosts
//! the concrete collector implementation.

pub mod datadog;

use ops_reasoner_core::DataRequirement;

pub use datadog::DatadogCollector;

/// Metric names queried for a metric requirement. Empty for log requirements.
pub fn metric_names(requirement: DataRequirement) -> &'static [&'static str] {
    match requirement {
        DataRequirement::CpuMetrics => &["system.cpu.user", "system.cpu.system", "system.cpu.idle"],
        DataRequirement::MemoryMetrics => &["system.mem.used", "system.mem.free"],
        DataRequirement::DiskMetrics => {
            &["system.disk.used", "system.disk.free", "system.disk.in_use"]
        }
        DataRequirement::NetworkMetrics => &[
            "system.net.bytes_sent",
            "system.net.bytes_rcvd",
            "network.http.response_time",
            "trace.http.request.hits",
            "trace.http.request.errors",
        ],
        DataRequirement::ErrorLogs | DataRequirement::PerformanceLogs => &[],
    }
}

/// Log search query for a log requirement. `None` for metric requirements.
pub fn log_query(requirement: DataRequirement) -> Option<&'static str> {
    match requirement {
        DataRequirement::ErrorLogs => Some("status:error"),
        DataRequirement::PerformanceLogs => Some("@duration:>1000 OR status:warn"),
        _ => None,
    }
}
