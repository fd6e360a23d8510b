use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::MoodRepository;
use crate::{
    models::{AnalyticsEvent, MoodEntry, NewMoodEntry, Subscription, UpsertUser, User},
    subscription::SubscriptionStatus,
};

const USER_COLUMNS: &str = "id, email, is_premium, stripe_customer_id, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, user_id, score, note, tags, entry_date, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: Uuid,
    status: String,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            id: row.id,
            user_id: row.user_id,
            status: SubscriptionStatus::parse(&row.status),
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
            updated_at: row.updated_at,
        }
    }
}

fn log_db_error(op: &str, e: &sqlx::Error) {
    if let Some(db_err) = e.as_database_error() {
        tracing::error!("❌ DB {} failed: {}", op, db_err.message());

        if let Some(code) = db_err.code() {
            tracing::info!("ℹ️ SQLSTATE code: {}", code);
        }

        if let Some(constraint) = db_err.constraint() {
            tracing::info!("🔒 Constraint violated: {}", constraint);
        }
    } else {
        tracing::error!("❌ DB {} failed: {}", op, e);
    }
}

#[async_trait]
impl MoodRepository for PgStore {
    async fn upsert_user(&self, user: &UpsertUser) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, updated_at = now()
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| log_db_error("user upsert", e))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .inspect_err(|e| log_db_error("user lookup", e))
    }

    async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE stripe_customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .inspect_err(|e| log_db_error("customer lookup", e))
    }

    async fn link_customer(&self, user_id: Uuid, customer_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET stripe_customer_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .inspect_err(|e| log_db_error("customer link", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET is_premium = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(is_premium)
            .execute(&self.pool)
            .await
            .inspect_err(|e| log_db_error("premium flag update", e))?;
        Ok(())
    }

    async fn insert_entry(&self, entry: &NewMoodEntry) -> Result<MoodEntry, sqlx::Error> {
        sqlx::query_as::<_, MoodEntry>(&format!(
            "INSERT INTO mood_entries (user_id, score, note, tags, entry_date)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(entry.user_id)
        .bind(entry.score)
        .bind(&entry.note)
        .bind(&entry.tags)
        .bind(entry.entry_date)
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| log_db_error("entry insert", e))
    }

    async fn count_entries_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM mood_entries WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| log_db_error("entry count", e))
    }

    async fn list_entries(
        &self,
        user_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<MoodEntry>, sqlx::Error> {
        sqlx::query_as::<_, MoodEntry>(&format!(
            "SELECT {ENTRY_COLUMNS}
             FROM mood_entries
             WHERE user_id = $1
               AND ($2::date IS NULL OR entry_date >= $2)
               AND ($3::date IS NULL OR entry_date <= $3)
             ORDER BY entry_date DESC, created_at DESC"
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .inspect_err(|e| log_db_error("entry list", e))
    }

    async fn delete_entry(&self, user_id: Uuid, entry_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM mood_entries WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(entry_id)
            .execute(&self.pool)
            .await
            .inspect_err(|e| log_db_error("entry delete", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn latest_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, status, current_period_end, cancel_at_period_end, updated_at
             FROM subscriptions
             WHERE user_id = $1
             ORDER BY updated_at DESC
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .inspect_err(|e| log_db_error("subscription lookup", e))?;

        Ok(row.map(Subscription::from))
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO subscriptions
                 (id, user_id, status, current_period_end, cancel_at_period_end, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                 user_id = EXCLUDED.user_id,
                 status = EXCLUDED.status,
                 current_period_end = EXCLUDED.current_period_end,
                 cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_end)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .inspect_err(|e| log_db_error("subscription upsert", e))?;
        Ok(())
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO analytics_events (user_id, name, properties) VALUES ($1, $2, $3)")
            .bind(event.user_id)
            .bind(&event.name)
            .bind(&event.properties)
            .execute(&self.pool)
            .await
            .inspect_err(|e| log_db_error("event insert", e))?;
        Ok(())
    }
}
