//! Persistence port.
//!
//! Handlers only see [`MoodRepository`]; [`PgStore`] is the Postgres
//! adapter wired up in `main`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{AnalyticsEvent, MoodEntry, NewMoodEntry, Subscription, UpsertUser, User};

mod postgres;

pub use postgres::PgStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MoodRepository: Send + Sync {
    async fn upsert_user(&self, user: &UpsertUser) -> Result<User, sqlx::Error>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<User>, sqlx::Error>;

    /// Returns `false` when the user does not exist.
    async fn link_customer(&self, user_id: Uuid, customer_id: &str) -> Result<bool, sqlx::Error>;

    /// Writes the denormalized premium flag on the user row.
    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> Result<(), sqlx::Error>;

    async fn insert_entry(&self, entry: &NewMoodEntry) -> Result<MoodEntry, sqlx::Error>;

    /// Entries created at or after `since`.
    async fn count_entries_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>;

    /// Newest first; both bounds inclusive.
    async fn list_entries(
        &self,
        user_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<MoodEntry>, sqlx::Error>;

    async fn delete_entry(&self, user_id: Uuid, entry_id: Uuid) -> Result<bool, sqlx::Error>;

    /// The most recently written subscription for the user.
    async fn latest_subscription(&self, user_id: Uuid)
        -> Result<Option<Subscription>, sqlx::Error>;

    /// Last write wins, keyed by provider subscription id.
    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), sqlx::Error>;

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), sqlx::Error>;
}
