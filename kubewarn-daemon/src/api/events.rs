//! Historical event endpoints.

use axum::Json;
use axum::extract::{Path, State};

use kubewarn_core::EventDocument;

use super::AppState;
use super::error::ApiError;

/// `GET /api/events`: every recorded event as `{id, data}`, in record order.
pub async fn list_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventDocument>>, ApiError> {
    Ok(Json(state.query.list_all().await?))
}

/// `GET /api/events/{uid}`: one recorded event, or 404.
pub async fn get_event(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<EventDocument>, ApiError> {
    state
        .query
        .get_by_id(&uid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("event '{uid}' has not been recorded")))
}
