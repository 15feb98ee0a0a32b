//! `GET /health`

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use kubewarn_core::pipeline::HealthStatus;

use super::AppState;
use crate::health::{DaemonHealth, ModuleHealth};

/// Report ingestion state and store reachability.
///
/// Responds 503 when the aggregated status is unhealthy, 200 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<DaemonHealth>) {
    let ingest = state.readiness.current().health_status();
    let store = match state.query.ping().await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => HealthStatus::Unhealthy(e.to_string()),
    };

    let report = DaemonHealth::from_modules(
        vec![
            ModuleHealth::new("ingest", ingest),
            ModuleHealth::new("event-store", store),
        ],
        state.started_at.elapsed().as_secs(),
    );

    let code = if report.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}
