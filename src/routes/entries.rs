use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    extract::{JsonBody, PathParams, QueryParams},
    limits::{check_new_entry, has_feature, month_start, Feature},
    models::{MoodEntry, NewMoodEntry},
    state::AppState,
    subscription::resolve_tier,
};

#[derive(Deserialize)]
pub struct NewEntryRequest {
    pub user_id: Uuid,
    pub score: i32,
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub entry_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct EntriesQuery {
    pub user_id: Uuid,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: Uuid,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub user_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<MoodEntry>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/entries", get(list_entries).post(create_entry))
        .route("/api/entries/:id", delete(delete_entry))
        .route("/api/export", get(export_entries))
        .with_state(state)
}

/// Trims tags, drops blanks and repeats, keeps first-seen order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

fn normalize_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

async fn create_entry(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<NewEntryRequest>,
) -> ApiResult<(StatusCode, Json<MoodEntry>)> {
    let score = i16::try_from(body.score)
        .ok()
        .filter(|s| (1..=10).contains(s))
        .ok_or_else(|| ApiError::BadRequest("score must be between 1 and 10".into()))?;

    let now = Utc::now();
    let tags = normalize_tags(body.tags);
    let note = normalize_note(body.note);

    let tier = resolve_tier(state.repo.as_ref(), body.user_id, now).await;
    let this_month = state
        .repo
        .count_entries_since(body.user_id, month_start(now))
        .await?;
    check_new_entry(tier, this_month, &tags, note.as_deref()).map_err(ApiError::LimitExceeded)?;

    let entry = state
        .repo
        .insert_entry(&NewMoodEntry {
            user_id: body.user_id,
            score,
            note,
            tags,
            entry_date: body.entry_date.unwrap_or_else(|| now.date_naive()),
        })
        .await
        .map_err(|e| {
            let unknown_user = e
                .as_database_error()
                .is_some_and(|db_err| db_err.is_foreign_key_violation());
            if unknown_user {
                ApiError::NotFound("user")
            } else {
                ApiError::Database(e)
            }
        })?;

    tracing::info!(user_id = %entry.user_id, entry_id = %entry.id, "📝 mood logged");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_entries(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<EntriesQuery>,
) -> ApiResult<Json<Vec<MoodEntry>>> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::BadRequest("`from` must not be after `to`".into()));
        }
    }

    let entries = state
        .repo
        .list_entries(query.user_id, query.from, query.to)
        .await?;
    Ok(Json(entries))
}

async fn delete_entry(
    State(state): State<AppState>,
    PathParams(id): PathParams<Uuid>,
    QueryParams(query): QueryParams<UserQuery>,
) -> ApiResult<StatusCode> {
    if state.repo.delete_entry(query.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("entry"))
    }
}

async fn export_entries(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<UserQuery>,
) -> ApiResult<Json<ExportResponse>> {
    let now = Utc::now();
    let tier = resolve_tier(state.repo.as_ref(), query.user_id, now).await;
    if !has_feature(tier, Feature::DataExport) {
        return Err(ApiError::FeatureLocked(Feature::DataExport));
    }

    let entries = state.repo.list_entries(query.user_id, None, None).await?;
    Ok(Json(ExportResponse {
        user_id: query.user_id,
        exported_at: now,
        entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get, json_request, send, Mocks};
    use axum::http::Method;
    use serde_json::json;

    fn stored(entry: &NewMoodEntry) -> MoodEntry {
        MoodEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            score: entry.score,
            note: entry.note.clone(),
            tags: entry.tags.clone(),
            entry_date: entry.entry_date,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = vec![" work ".into(), "".into(), "work".into(), "sleep".into()];
        assert_eq!(normalize_tags(tags), vec!["work".to_string(), "sleep".to_string()]);
        assert_eq!(normalize_note(Some("   ".into())), None);
    }

    #[tokio::test]
    async fn body_missing_user_is_a_json_bad_request() {
        let mut mocks = Mocks::new();
        mocks.repo.expect_insert_entry().never();

        let (status, body) = send(
            mocks.into_app(),
            json_request(Method::POST, "/api/entries", json!({ "score": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .is_some_and(|e| e.contains("missing field `user_id`")));
        assert!(body["details"].is_null());
    }

    #[tokio::test]
    async fn bad_date_filter_is_a_json_bad_request() {
        let uri = format!("/api/entries?user_id={}&from=yesterday", Uuid::new_v4());
        let (status, body) = send(Mocks::new().into_app(), get(&uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn creates_entry_within_free_limits() {
        let user_id = Uuid::new_v4();
        let mut mocks = Mocks::new().free();
        mocks.repo.expect_count_entries_since().returning(|_, _| Ok(12));
        mocks
            .repo
            .expect_insert_entry()
            .withf(|e| e.score == 7 && e.tags == vec!["calm".to_string()])
            .times(1)
            .returning(|e| Ok(stored(e)));

        let (status, body) = send(
            mocks.into_app(),
            json_request(
                Method::POST,
                "/api/entries",
                json!({ "user_id": user_id, "score": 7, "tags": ["calm"], "note": "ok day" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["score"], 7);
        assert_eq!(body["note"], "ok day");
    }

    #[tokio::test]
    async fn free_user_at_monthly_cap_is_refused() {
        let mut mocks = Mocks::new().free();
        mocks.repo.expect_count_entries_since().returning(|_, _| Ok(50));
        mocks.repo.expect_insert_entry().never();

        let (status, body) = send(
            mocks.into_app(),
            json_request(
                Method::POST,
                "/api/entries",
                json!({ "user_id": Uuid::new_v4(), "score": 5 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["details"]["limit"]["limit"], "monthly_entries");
        assert_eq!(body["details"]["upgrade_prompt"]["trigger"], "entry_limit");
    }

    #[tokio::test]
    async fn premium_user_skips_caps() {
        let mut mocks = Mocks::new().premium();
        mocks.repo.expect_count_entries_since().returning(|_, _| Ok(400));
        mocks
            .repo
            .expect_insert_entry()
            .times(1)
            .returning(|e| Ok(stored(e)));

        let (status, _) = send(
            mocks.into_app(),
            json_request(
                Method::POST,
                "/api/entries",
                json!({
                    "user_id": Uuid::new_v4(),
                    "score": 9,
                    "tags": ["a", "b", "c", "d", "e"],
                    "note": "x".repeat(500),
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn out_of_range_score_is_rejected() {
        let (status, body) = send(
            Mocks::new().into_app(),
            json_request(
                Method::POST,
                "/api/entries",
                json!({ "user_id": Uuid::new_v4(), "score": 11 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "score must be between 1 and 10");
    }

    #[tokio::test]
    async fn deleting_missing_entry_is_not_found() {
        let mut mocks = Mocks::new();
        mocks.repo.expect_delete_entry().returning(|_, _| Ok(false));

        let uri = format!("/api/entries/{}?user_id={}", Uuid::new_v4(), Uuid::new_v4());
        let (status, body) = send(
            mocks.into_app(),
            json_request(Method::DELETE, &uri, json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "entry not found");
    }

    #[tokio::test]
    async fn export_is_premium_only() {
        let uri = format!("/api/export?user_id={}", Uuid::new_v4());
        let (status, body) = send(Mocks::new().free().into_app(), get(&uri)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["details"]["feature"], "data_export");
    }

    #[tokio::test]
    async fn list_failure_is_a_json_error() {
        let mut mocks = Mocks::new();
        mocks
            .repo
            .expect_list_entries()
            .returning(|_, _, _| Err(sqlx::Error::PoolTimedOut));

        let uri = format!("/api/entries?user_id={}", Uuid::new_v4());
        let (status, body) = send(mocks.into_app(), get(&uri)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "DB error");
    }
}
