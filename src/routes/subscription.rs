use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiResult,
    extract::QueryParams,
    limits::{month_start, UsageSummary},
    state::AppState,
    subscription::{resolve_tier, SubscriptionView},
};

#[derive(Deserialize)]
struct UserQuery {
    user_id: Uuid,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/subscription", get(get_subscription))
        .route("/api/limits", get(get_limits))
        .with_state(state)
}

/// A failed read answers with the free view instead of an error.
async fn get_subscription(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<UserQuery>,
) -> Json<SubscriptionView> {
    let now = Utc::now();
    match state.repo.latest_subscription(query.user_id).await {
        Ok(subscription) => Json(SubscriptionView::from_cached(subscription.as_ref(), now)),
        Err(e) => {
            tracing::warn!(user_id = %query.user_id, error = %e, "⚠️ subscription read failed");
            Json(SubscriptionView::free())
        }
    }
}

async fn get_limits(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<UserQuery>,
) -> ApiResult<Json<UsageSummary>> {
    let now = Utc::now();
    let tier = resolve_tier(state.repo.as_ref(), query.user_id, now).await;
    let this_month = state
        .repo
        .count_entries_since(query.user_id, month_start(now))
        .await?;
    Ok(Json(UsageSummary::new(tier, this_month)))
}
