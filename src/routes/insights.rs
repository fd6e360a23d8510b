use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    analytics,
    error::{ApiError, ApiResult},
    extract::JsonBody,
    insights::{self, Insight, INSIGHT_WINDOW_DAYS},
    limits::{has_feature, Feature},
    state::AppState,
    subscription::resolve_tier,
};

#[derive(Deserialize)]
pub struct InsightRequest {
    user_id: Uuid,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/insights", post(create_insight))
        .with_state(state)
}

async fn create_insight(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<InsightRequest>,
) -> ApiResult<Json<Insight>> {
    let now = Utc::now();
    let tier = resolve_tier(state.repo.as_ref(), body.user_id, now).await;
    if !has_feature(tier, Feature::AiInsights) {
        return Err(ApiError::FeatureLocked(Feature::AiInsights));
    }

    let today = now.date_naive();
    let recent = state
        .repo
        .list_entries(
            body.user_id,
            Some(analytics::window_start(today, INSIGHT_WINDOW_DAYS)),
            Some(today),
        )
        .await?;
    let stats = analytics::compute(&recent, today, tier);

    let insight = insights::generate(state.insights.as_ref(), &stats, &recent, today).await;
    Ok(Json(insight))
}
