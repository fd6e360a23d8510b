use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    extract::{JsonBody, PathParams},
    models::{UpsertUser, User},
    state::AppState,
};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/users", post(upsert_user))
        .route("/api/users/:id", get(get_user))
        .with_state(state)
}

/// Mirrors the auth provider's user into our table.
async fn upsert_user(
    State(state): State<AppState>,
    JsonBody(mut body): JsonBody<UpsertUser>,
) -> ApiResult<Json<User>> {
    body.email = body.email.trim().to_lowercase();
    if !body.email.contains('@') {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }

    let user = state.repo.upsert_user(&body).await?;
    Ok(Json(user))
}

async fn get_user(
    State(state): State<AppState>,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<Json<User>> {
    state
        .repo
        .find_user(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("user"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get, json_request, send, Mocks};
    use axum::http::{Method, StatusCode};
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_normalises_email() {
        let id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        mocks
            .repo
            .expect_upsert_user()
            .withf(|u| u.email == "sam@example.com")
            .times(1)
            .returning(|u| {
                Ok(User {
                    id: u.id,
                    email: u.email.clone(),
                    is_premium: false,
                    stripe_customer_id: Some("cus_hidden".into()),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
            });

        let (status, body) = send(
            mocks.into_app(),
            json_request(
                Method::POST,
                "/api/users",
                json!({ "id": id, "email": "  Sam@Example.com " }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "sam@example.com");
        assert!(body.get("stripe_customer_id").is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_email() {
        let (status, _) = send(
            Mocks::new().into_app(),
            json_request(
                Method::POST,
                "/api/users",
                json!({ "id": Uuid::new_v4(), "email": "nope" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_id_is_a_json_bad_request() {
        let mut mocks = Mocks::new();
        mocks.repo.expect_find_user().never();

        let (status, body) = send(mocks.into_app(), get("/api/users/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("UUID")));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let mut mocks = Mocks::new();
        mocks.repo.expect_find_user().returning(|_| Ok(None));

        let (status, body) = send(
            mocks.into_app(),
            get(&format!("/api/users/{}", Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "user not found");
    }
}
