//! Billing provider port and webhook reconciliation.
//!
//! The provider owns subscriptions. We keep a cached copy and overwrite it
//! with whatever the provider last told us.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::Subscription,
    store::MoodRepository,
    subscription::{is_premium, SubscriptionStatus},
};

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("billing transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("billing provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("billing provider response missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,
    #[error("malformed signature header")]
    MalformedSignature,
    #[error("signature timestamp outside tolerance")]
    StaleTimestamp,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub email: String,
    /// Reuse the provider customer when the user already has one.
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError>;

    /// Returns the URL of a self-service billing portal session.
    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError>;
}

/// Provider events reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    CheckoutCompleted {
        user_id: Option<Uuid>,
        customer_id: Option<String>,
    },
    SubscriptionChanged {
        subscription_id: String,
        customer_id: Option<String>,
        user_id: Option<Uuid>,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
        cancel_at_period_end: bool,
    },
    Ignored {
        kind: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    CustomerLinked { user_id: Uuid },
    SubscriptionSynced { user_id: Uuid, premium: bool },
    UnknownUser,
    Ignored,
}

/// Applies one provider event to the cached state.
///
/// Events naming users we do not know are acknowledged, not failed, so the
/// provider does not keep redelivering them. Store failures propagate so it
/// does.
pub async fn apply_event(
    repo: &dyn MoodRepository,
    event: BillingEvent,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, sqlx::Error> {
    match event {
        BillingEvent::CheckoutCompleted {
            user_id: Some(user_id),
            customer_id: Some(customer_id),
        } => {
            if repo.link_customer(user_id, &customer_id).await? {
                tracing::info!(%user_id, %customer_id, "💳 checkout completed, customer linked");
                Ok(WebhookOutcome::CustomerLinked { user_id })
            } else {
                tracing::warn!(%user_id, "checkout completed for unknown user");
                Ok(WebhookOutcome::UnknownUser)
            }
        }
        BillingEvent::CheckoutCompleted { .. } => {
            tracing::warn!("checkout completed without user or customer reference");
            Ok(WebhookOutcome::UnknownUser)
        }
        BillingEvent::SubscriptionChanged {
            subscription_id,
            customer_id,
            user_id,
            status,
            current_period_end,
            cancel_at_period_end,
        } => {
            let Some(user_id) = owner_of(repo, user_id, customer_id.as_deref()).await? else {
                tracing::warn!(%subscription_id, "subscription event for unknown user");
                return Ok(WebhookOutcome::UnknownUser);
            };

            repo.upsert_subscription(&Subscription {
                id: subscription_id.clone(),
                user_id,
                status,
                current_period_end,
                cancel_at_period_end,
                updated_at: now,
            })
            .await?;

            let premium = is_premium(status, current_period_end, now);
            repo.set_premium(user_id, premium).await?;

            tracing::info!(
                %user_id,
                %subscription_id,
                status = status.as_str(),
                premium,
                "🔄 subscription synced"
            );
            Ok(WebhookOutcome::SubscriptionSynced { user_id, premium })
        }
        BillingEvent::Ignored { kind } => {
            tracing::debug!(%kind, "ignoring billing event");
            Ok(WebhookOutcome::Ignored)
        }
    }
}

/// Metadata wins; otherwise fall back to the linked customer id.
async fn owner_of(
    repo: &dyn MoodRepository,
    user_id: Option<Uuid>,
    customer_id: Option<&str>,
) -> Result<Option<Uuid>, sqlx::Error> {
    if let Some(user_id) = user_id {
        if repo.find_user(user_id).await?.is_some() {
            return Ok(Some(user_id));
        }
    }
    match customer_id {
        Some(customer_id) => Ok(repo
            .find_user_by_customer(customer_id)
            .await?
            .map(|user| user.id)),
        None => Ok(None),
    }
}
