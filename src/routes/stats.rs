use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    analytics::{self, MoodStats, FREE_HISTORY_DAYS, MAX_HISTORY_DAYS},
    error::{ApiError, ApiResult},
    extract::QueryParams,
    limits::{has_feature, Feature},
    state::AppState,
    subscription::resolve_tier,
};

#[derive(Deserialize)]
pub struct StatsQuery {
    user_id: Uuid,
    days: Option<i64>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    days: i64,
    from: NaiveDate,
    to: NaiveDate,
    #[serde(flatten)]
    stats: MoodStats,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/stats", get(get_stats))
        .with_state(state)
}

async fn get_stats(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let days = query.days.unwrap_or(FREE_HISTORY_DAYS);
    if !(1..=MAX_HISTORY_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_HISTORY_DAYS}"
        )));
    }

    let now = Utc::now();
    let tier = resolve_tier(state.repo.as_ref(), query.user_id, now).await;
    if days > FREE_HISTORY_DAYS && !has_feature(tier, Feature::AdvancedAnalytics) {
        return Err(ApiError::FeatureLocked(Feature::AdvancedAnalytics));
    }

    let today = now.date_naive();
    let from = analytics::window_start(today, days);
    let entries = state
        .repo
        .list_entries(query.user_id, Some(from), Some(today))
        .await?;

    Ok(Json(StatsResponse {
        days,
        from,
        to: today,
        stats: analytics::compute(&entries, today, tier),
    }))
}
