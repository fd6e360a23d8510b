//! Handler error type rendered as `{ "error": .., "details": .. }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
    billing::WebhookError,
    limits::{Feature, LimitViolation, UpgradePrompt},
};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{}", .0.message())]
    LimitExceeded(LimitViolation),
    #[error("this feature requires Premium")]
    FeatureLocked(Feature),
    #[error("invalid webhook")]
    Webhook(#[from] WebhookError),
    #[error("{service} request failed")]
    Upstream {
        service: &'static str,
        details: String,
    },
    #[error("DB error")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: Value,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Webhook(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::LimitExceeded(_) | ApiError::FeatureLocked(_) => StatusCode::FORBIDDEN,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::LimitExceeded(violation) => json!({
                "limit": violation,
                "upgrade_prompt": UpgradePrompt::for_trigger(violation.trigger()),
            }),
            ApiError::FeatureLocked(feature) => json!({
                "feature": feature,
                "upgrade_prompt": UpgradePrompt::for_trigger(feature.trigger()),
            }),
            ApiError::Webhook(e) => Value::String(e.to_string()),
            ApiError::Upstream { details, .. } => Value::String(details.clone()),
            // Database internals stay in the logs.
            _ => Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "❌ request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}
