use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    extract::JsonBody,
    models::AnalyticsEvent,
    state::AppState,
};

const MAX_EVENT_NAME_LEN: usize = 100;

#[derive(Deserialize)]
pub struct EventBody {
    user_id: Option<Uuid>,
    name: String,
    #[serde(default)]
    properties: Option<Value>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/events", post(track_event))
        .with_state(state)
}

/// Analytics must never break the client: storage failures are only logged.
async fn track_event(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EventBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = body.name.trim();
    if name.is_empty() || name.chars().count() > MAX_EVENT_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "event name must be 1-{MAX_EVENT_NAME_LEN} characters"
        )));
    }

    let event = AnalyticsEvent {
        user_id: body.user_id,
        name: name.to_string(),
        properties: body.properties.unwrap_or_else(|| json!({})),
    };
    tracing::info!(name = %event.name, user_id = ?event.user_id, "📊 event");

    if let Err(e) = state.repo.record_event(&event).await {
        tracing::warn!(name = %event.name, error = %e, "⚠️ failed to store analytics event");
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}
