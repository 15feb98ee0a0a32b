//! Daemon health report.
//!
//! Built from per-module statuses, both by the orchestrator (registered
//! modules) and by `GET /health` (ingestion state and store reachability).

use serde::Serialize;

use kubewarn_core::pipeline::HealthStatus;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all modules).
    #[serde(flatten)]
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-module health reports.
    pub modules: Vec<ModuleHealth>,
}

impl DaemonHealth {
    /// Build a report whose overall status is aggregated from `modules`.
    pub fn from_modules(modules: Vec<ModuleHealth>, uptime_secs: u64) -> Self {
        Self {
            status: aggregate_status(&modules),
            uptime_secs,
            modules,
        }
    }
}

/// Health status for a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Module name (e.g., "ingest", "event-store").
    pub name: String,
    /// Current health status of the module.
    #[serde(flatten)]
    pub status: HealthStatus,
}

impl ModuleHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Aggregate module statuses into one.
///
/// The worst level wins: Unhealthy > Degraded > Healthy.
/// Reasons of the modules at that level are joined with `"; "`.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let Some(worst) = modules.iter().map(|m| severity(&m.status)).max() else {
        return HealthStatus::Healthy;
    };

    let reasons = modules
        .iter()
        .filter(|m| severity(&m.status) == worst)
        .filter_map(|m| match &m.status {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                Some(format!("{}: {}", m.name, reason))
            }
        })
        .collect::<Vec<_>>()
        .join("; ");

    match worst {
        0 => HealthStatus::Healthy,
        1 => HealthStatus::Degraded(reasons),
        _ => HealthStatus::Unhealthy(reasons),
    }
}

fn severity(status: &HealthStatus) -> u8 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Degraded(_) => 1,
        HealthStatus::Unhealthy(_) => 2,
    }
}
