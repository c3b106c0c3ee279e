use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{DbError, DbResult};
use crate::models::{NewPeriod, SubscriptionPeriod};
use crate::repositories::SubscriptionStore;

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for SubscriptionRepository {
    async fn append(&self, period: NewPeriod) -> DbResult<SubscriptionPeriod> {
        if period.ends_at <= period.starts_at {
            return Err(DbError::InvalidPeriod);
        }

        let rec = sqlx::query_as::<_, SubscriptionPeriod>(
            r#"
            INSERT INTO subscription_periods (user_id, plan_id, starts_at, ends_at, active, payment_link_id)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            RETURNING *
            "#,
        )
        .bind(period.user_id)
        .bind(&period.plan_id)
        .bind(period.starts_at)
        .bind(period.ends_at)
        .bind(&period.payment_link_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn get_active_until(&self, user_id: i64) -> DbResult<Option<DateTime<Utc>>> {
        let until = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(ends_at) FROM subscription_periods WHERE user_id = $1 AND active = TRUE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(until)
    }

    async fn get_all_by_user(&self, user_id: i64) -> DbResult<Vec<SubscriptionPeriod>> {
        let periods = sqlx::query_as::<_, SubscriptionPeriod>(
            "SELECT * FROM subscription_periods WHERE user_id = $1 ORDER BY starts_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(periods)
    }

    async fn get_latest_ends(&self) -> DbResult<Vec<(i64, DateTime<Utc>)>> {
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "SELECT user_id, MAX(ends_at) FROM subscription_periods WHERE active = TRUE GROUP BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn deactivate_by_user(&self, user_id: i64) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE subscription_periods SET active = FALSE WHERE user_id = $1 AND active = TRUE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_by_payment(&self, link_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE subscription_periods SET active = FALSE WHERE payment_link_id = $1 AND active = TRUE",
        )
        .bind(link_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
