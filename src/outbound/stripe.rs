//! Stripe REST adapter: checkout, billing portal, webhook verification.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    billing::{
        BillingError, BillingEvent, BillingProvider, CheckoutRequest, CheckoutSession,
        WebhookError,
    },
    config::StripeConfig,
    subscription::SubscriptionStatus,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";
const DEFAULT_TOLERANCE_SECS: i64 = 300;
/// Keeps `current_period_end` on the subscription object.
pub const API_VERSION: &str = "2024-06-20";

pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
    price_id: String,
    app_base_url: String,
}

impl StripeClient {
    pub fn new(
        config: &StripeConfig,
        app_base_url: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            price_id: config.price_id.clone(),
            app_base_url: app_base_url.to_string(),
        })
    }

    fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        let user_id = request.user_id.to_string();
        let mut form = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", self.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "success_url",
                format!("{}/dashboard?checkout=success", self.app_base_url),
            ),
            (
                "cancel_url",
                format!("{}/pricing?checkout=cancelled", self.app_base_url),
            ),
            ("client_reference_id", user_id.clone()),
            ("metadata[user_id]", user_id.clone()),
            ("subscription_data[metadata][user_id]", user_id),
        ];
        match &request.customer_id {
            Some(customer) => form.push(("customer", customer.clone())),
            None => form.push(("customer_email", request.email.clone())),
        }
        form
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .header("Stripe-Version", API_VERSION)
    }

    async fn post_form<T>(&self, path: &str, form: &[(&str, String)]) -> Result<T, BillingError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.post(path).form(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| status.to_string());
            tracing::error!(status = status.as_u16(), %message, "❌ Stripe API error");
            return Err(BillingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorMessage,
}

#[derive(Deserialize)]
struct StripeErrorMessage {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: Option<String>,
    url: Option<String>,
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        let session: SessionResponse = self
            .post_form("/v1/checkout/sessions", &self.checkout_form(request))
            .await?;
        Ok(CheckoutSession {
            id: session.id.ok_or(BillingError::MissingField("id"))?,
            url: session.url.ok_or(BillingError::MissingField("url"))?,
        })
    }

    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError> {
        let form = [
            ("customer", customer_id.to_string()),
            ("return_url", format!("{}/settings", self.app_base_url)),
        ];
        let session: SessionResponse = self
            .post_form("/v1/billing_portal/sessions", &form)
            .await?;
        session.url.ok_or(BillingError::MissingField("url"))
    }
}

/// Checks `Stripe-Signature` headers (`t=<unix>,v1=<hex hmac>`).
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let header = header.ok_or(WebhookError::MissingSignature)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedSignature);
        }
        if (now.timestamp() - timestamp).abs() > self.tolerance_secs {
            return Err(WebhookError::StaleTimestamp);
        }

        let matches = signatures.iter().any(|candidate| {
            let Ok(expected) = hex::decode(candidate) else {
                return false;
            };
            let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()) else {
                return false;
            };
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.verify_slice(&expected).is_ok()
        });

        if matches {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    kind: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    client_reference_id: Option<String>,
    customer: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: Option<String>,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    user_id: Option<String>,
}

fn parse_user_id(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|id| Uuid::parse_str(id).ok())
}

/// Decodes a verified webhook body into a [`BillingEvent`].
pub fn parse_event(payload: &[u8]) -> Result<BillingEvent, WebhookError> {
    let invalid = |e: serde_json::Error| WebhookError::InvalidPayload(e.to_string());
    let event: StripeEvent = serde_json::from_slice(payload).map_err(invalid)?;

    match event.kind.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject =
                serde_json::from_value(event.data.object).map_err(invalid)?;
            let user_id = parse_user_id(session.client_reference_id.as_deref())
                .or_else(|| parse_user_id(session.metadata.user_id.as_deref()));
            Ok(BillingEvent::CheckoutCompleted {
                user_id,
                customer_id: session.customer,
            })
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let sub: SubscriptionObject =
                serde_json::from_value(event.data.object).map_err(invalid)?;
            Ok(BillingEvent::SubscriptionChanged {
                user_id: parse_user_id(sub.metadata.user_id.as_deref()),
                customer_id: sub.customer,
                status: SubscriptionStatus::parse(&sub.status),
                current_period_end: sub
                    .current_period_end
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                cancel_at_period_end: sub.cancel_at_period_end,
                subscription_id: sub.id,
            })
        }
        _ => Ok(BillingEvent::Ignored { kind: event.kind }),
    }
}
