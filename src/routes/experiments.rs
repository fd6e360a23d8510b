use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    experiments::{assign_variant, find},
    extract::{PathParams, QueryParams},
};

#[derive(Deserialize)]
struct UserQuery {
    user_id: Uuid,
}

#[derive(Serialize)]
pub struct Assignment {
    experiment: &'static str,
    variant: &'static str,
}

pub fn routes() -> Router {
    Router::new().route("/api/experiments/:name", get(get_assignment))
}

async fn get_assignment(
    PathParams(name): PathParams<String>,
    QueryParams(query): QueryParams<UserQuery>,
) -> ApiResult<Json<Assignment>> {
    let experiment = find(&name).ok_or(ApiError::NotFound("experiment"))?;
    let variant = assign_variant(experiment, query.user_id);
    tracing::debug!(experiment = experiment.name, variant, user_id = %query.user_id, "experiment assignment");

    Ok(Json(Assignment {
        experiment: experiment.name,
        variant,
    }))
}
