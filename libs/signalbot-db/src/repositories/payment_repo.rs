use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::{NewPaymentRecord, PaymentRecord, PaymentStatus};
use crate::repositories::PaymentStore;

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn create(&self, record: NewPaymentRecord) -> DbResult<PaymentRecord> {
        let rec = sqlx::query_as::<_, PaymentRecord>(
            r#"
            INSERT INTO payments (link_id, user_id, plan_id, amount, status, short_url)
            VALUES ($1, $2, $3, $4, 'created', $5)
            RETURNING *
            "#,
        )
        .bind(&record.link_id)
        .bind(record.user_id)
        .bind(&record.plan_id)
        .bind(record.amount)
        .bind(&record.short_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn get_by_link_id(&self, link_id: &str) -> DbResult<Option<PaymentRecord>> {
        let rec = sqlx::query_as::<_, PaymentRecord>("SELECT * FROM payments WHERE link_id = $1")
            .bind(link_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn transition_status(
        &self,
        link_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        gateway_payment_id: Option<&str>,
    ) -> DbResult<Option<PaymentRecord>> {
        // The status predicate makes this a check-and-set: of two concurrent
        // deliveries only one sees a row come back.
        let rec = sqlx::query_as::<_, PaymentRecord>(
            r#"
            UPDATE payments
            SET status = $3,
                gateway_payment_id = COALESCE($4, gateway_payment_id),
                updated_at = CURRENT_TIMESTAMP
            WHERE link_id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(link_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn get_latest_pending_by_user(&self, user_id: i64) -> DbResult<Option<PaymentRecord>> {
        let rec = sqlx::query_as::<_, PaymentRecord>(
            "SELECT * FROM payments WHERE user_id = $1 AND status = 'created' ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }
}
