use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subscription::SubscriptionStatus;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub is_premium: bool,
    #[serde(skip_serializing)]
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertUser {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct MoodEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub score: i16,
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub entry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated entry ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMoodEntry {
    pub user_id: Uuid,
    pub score: i16,
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub entry_date: NaiveDate,
}

/// Cached copy of the billing provider's subscription; the provider owns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    /// Provider subscription id.
    pub id: String,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub user_id: Option<Uuid>,
    pub name: String,
    pub properties: serde_json::Value,
}
