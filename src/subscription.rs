//! Reconciling the cached billing subscription into a [`Tier`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{limits::Tier, models::Subscription, store::MoodRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
    Unknown,
}

impl SubscriptionStatus {
    /// Provider strings outside the known set map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" | "cancelled" => Self::Canceled,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "unpaid" => Self::Unpaid,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_active_like(self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

/// Premium requires an active-like status and a period end strictly after `now`.
pub fn is_premium(
    status: SubscriptionStatus,
    current_period_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    status.is_active_like() && current_period_end.is_some_and(|end| end > now)
}

pub fn tier_for(subscription: Option<&Subscription>, now: DateTime<Utc>) -> Tier {
    Tier::from_premium(
        subscription.is_some_and(|s| is_premium(s.status, s.current_period_end, now)),
    )
}

/// Reads the cached subscription; any read failure counts as free.
pub async fn resolve_tier(repo: &dyn MoodRepository, user_id: Uuid, now: DateTime<Utc>) -> Tier {
    match repo.latest_subscription(user_id).await {
        Ok(subscription) => tier_for(subscription.as_ref(), now),
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "⚠️ subscription read failed, defaulting to free");
            Tier::Free
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionView {
    pub tier: Tier,
    pub status: Option<SubscriptionStatus>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

impl SubscriptionView {
    pub fn free() -> Self {
        SubscriptionView {
            tier: Tier::Free,
            status: None,
            current_period_end: None,
            cancel_at_period_end: false,
        }
    }

    pub fn from_cached(subscription: Option<&Subscription>, now: DateTime<Utc>) -> Self {
        match subscription {
            Some(s) => SubscriptionView {
                tier: tier_for(Some(s), now),
                status: Some(s.status),
                current_period_end: s.current_period_end,
                cancel_at_period_end: s.cancel_at_period_end,
            },
            None => Self::free(),
        }
    }
}
