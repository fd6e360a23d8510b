use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    billing::{apply_event, BillingError, CheckoutRequest},
    error::{ApiError, ApiResult},
    extract::JsonBody,
    outbound::stripe::{parse_event, SIGNATURE_HEADER},
    state::AppState,
    subscription::resolve_tier,
};

#[derive(Deserialize)]
pub struct CheckoutBody {
    user_id: Uuid,
    email: String,
}

#[derive(Deserialize)]
pub struct PortalBody {
    user_id: Uuid,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    session_id: String,
    url: String,
}

#[derive(Serialize)]
pub struct PortalResponse {
    url: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/checkout", post(create_checkout))
        .route("/api/billing-portal", post(create_portal))
        .route("/api/webhooks/stripe", post(stripe_webhook))
        .with_state(state)
}

fn upstream(e: BillingError) -> ApiError {
    tracing::error!(error = %e, "❌ billing provider call failed");
    ApiError::Upstream {
        service: "billing",
        details: e.to_string(),
    }
}

async fn create_checkout(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CheckoutBody>,
) -> ApiResult<Json<CheckoutResponse>> {
    let email = body.email.trim();
    if !email.contains('@') {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }

    let tier = resolve_tier(state.repo.as_ref(), body.user_id, Utc::now()).await;
    if tier.is_premium() {
        return Err(ApiError::Conflict("already subscribed to Premium".into()));
    }

    let customer_id = state
        .repo
        .find_user(body.user_id)
        .await?
        .and_then(|user| user.stripe_customer_id);

    let session = state
        .billing
        .create_checkout_session(&CheckoutRequest {
            user_id: body.user_id,
            email: email.to_string(),
            customer_id,
        })
        .await
        .map_err(upstream)?;

    tracing::info!(user_id = %body.user_id, session_id = %session.id, "💳 checkout session created");
    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

async fn create_portal(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<PortalBody>,
) -> ApiResult<Json<PortalResponse>> {
    let user = state
        .repo
        .find_user(body.user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    let customer_id = user
        .stripe_customer_id
        .ok_or(ApiError::NotFound("billing customer"))?;

    let url = state
        .billing
        .create_portal_session(&customer_id)
        .await
        .map_err(upstream)?;
    Ok(Json(PortalResponse { url }))
}

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let now = Utc::now();
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state.webhooks.verify(&body, signature, now).inspect_err(|e| {
        tracing::warn!(error = %e, "🚫 rejected webhook");
    })?;
    let event = parse_event(&body)?;
    apply_event(state.repo.as_ref(), event, now).await?;

    Ok(Json(json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        billing::CheckoutSession,
        models::User,
        routes::test_support::{json_request, send, Mocks, WEBHOOK_SECRET},
    };
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn user(id: Uuid, customer: Option<&str>) -> User {
        User {
            id,
            email: "sam@example.com".into(),
            is_premium: false,
            stripe_customer_id: customer.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn signed_webhook(payload: &str, secret: &str) -> Request<Body> {
        let timestamp = Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/webhooks/stripe")
            .header(SIGNATURE_HEADER, format!("t={timestamp},v1={signature}"))
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn checkout_returns_session_url() {
        let user_id = Uuid::new_v4();
        let mut mocks = Mocks::new().free();
        mocks
            .repo
            .expect_find_user()
            .returning(|id| Ok(Some(user(id, Some("cus_7")))));
        mocks
            .billing
            .expect_create_checkout_session()
            .withf(|r| r.customer_id.as_deref() == Some("cus_7"))
            .times(1)
            .returning(|_| {
                Ok(CheckoutSession {
                    id: "cs_1".into(),
                    url: "https://checkout.stripe.com/c/cs_1".into(),
                })
            });

        let (status, body) = send(
            mocks.into_app(),
            json_request(
                Method::POST,
                "/api/checkout",
                json!({ "user_id": user_id, "email": "sam@example.com" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "cs_1");
        assert_eq!(body["url"], "https://checkout.stripe.com/c/cs_1");
    }

    #[tokio::test]
    async fn checkout_provider_failure_is_json_bad_gateway() {
        let mut mocks = Mocks::new().free();
        mocks.repo.expect_find_user().returning(|_| Ok(None));
        mocks.billing.expect_create_checkout_session().returning(|_| {
            Err(BillingError::Api {
                status: 402,
                message: "No such price".into(),
            })
        });

        let (status, body) = send(
            mocks.into_app(),
            json_request(
                Method::POST,
                "/api/checkout",
                json!({ "user_id": Uuid::new_v4(), "email": "sam@example.com" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "billing request failed");
        assert_eq!(body["details"], "billing provider returned 402: No such price");
    }

    #[tokio::test]
    async fn premium_users_cannot_checkout_again() {
        let mut mocks = Mocks::new().premium();
        mocks.billing.expect_create_checkout_session().never();

        let (status, _) = send(
            mocks.into_app(),
            json_request(
                Method::POST,
                "/api/checkout",
                json!({ "user_id": Uuid::new_v4(), "email": "sam@example.com" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn portal_requires_linked_customer() {
        let mut mocks = Mocks::new();
        mocks
            .repo
            .expect_find_user()
            .returning(|id| Ok(Some(user(id, None))));

        let (status, body) = send(
            mocks.into_app(),
            json_request(
                Method::POST,
                "/api/billing-portal",
                json!({ "user_id": Uuid::new_v4() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "billing customer not found");
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_rejected() {
        let mut mocks = Mocks::new();
        mocks.repo.expect_upsert_subscription().never();

        let payload = r#"{"type":"customer.subscription.updated","data":{"object":{}}}"#;
        let (status, body) = send(mocks.into_app(), signed_webhook(payload, "whsec_wrong")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], "signature mismatch");
    }

    #[tokio::test]
    async fn webhook_syncs_subscription() {
        let user_id = Uuid::new_v4();
        let end = Utc::now().timestamp() + 86_400;
        let payload = json!({
            "type": "customer.subscription.created",
            "data": { "object": {
                "id": "sub_9",
                "customer": "cus_9",
                "status": "active",
                "current_period_end": end,
                "metadata": { "user_id": user_id.to_string() }
            }}
        })
        .to_string();

        let mut mocks = Mocks::new();
        mocks
            .repo
            .expect_find_user()
            .returning(|id| Ok(Some(user(id, Some("cus_9")))));
        mocks
            .repo
            .expect_upsert_subscription()
            .withf(|s| s.id == "sub_9")
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .repo
            .expect_set_premium()
            .withf(move |id, premium| *id == user_id && *premium)
            .times(1)
            .returning(|_, _| Ok(()));

        let (status, body) = send(mocks.into_app(), signed_webhook(&payload, WEBHOOK_SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
    }

    #[tokio::test]
    async fn webhook_store_failure_asks_for_redelivery() {
        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "client_reference_id": Uuid::new_v4().to_string(),
                "customer": "cus_1"
            }}
        })
        .to_string();

        let mut mocks = Mocks::new();
        mocks
            .repo
            .expect_link_customer()
            .returning(|_, _| Err(sqlx::Error::PoolTimedOut));

        let (status, _) = send(mocks.into_app(), signed_webhook(&payload, WEBHOOK_SECRET)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
