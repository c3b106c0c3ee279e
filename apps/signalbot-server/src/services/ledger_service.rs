use std::sync::Arc;

use chrono::{DateTime, Utc};
use signalbot_db::DbError;
use signalbot_db::models::{NewPeriod, SubscriptionPeriod};
use signalbot_db::repositories::SubscriptionStore;
use signalbot_shared::PlanId;
use tracing::debug;

use crate::error::BillingError;

/// Append-only record of subscription periods. Periods may overlap; the
/// latest end among active periods wins.
#[derive(Clone)]
pub struct SubscriptionLedger {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionLedger {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    pub async fn append_period(
        &self,
        user_id: i64,
        plan: PlanId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        payment_link_id: &str,
    ) -> Result<SubscriptionPeriod, BillingError> {
        if ends_at <= starts_at {
            return Err(DbError::InvalidPeriod.into());
        }

        let period = self
            .store
            .append(NewPeriod {
                user_id,
                plan_id: plan.as_str().to_string(),
                starts_at,
                ends_at,
                payment_link_id: payment_link_id.to_string(),
            })
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => BillingError::AlreadyFinalized(payment_link_id.to_string()),
                other => other.into(),
            })?;

        debug!(
            "Appended period #{} for user {}: {} -> {}",
            period.id, user_id, starts_at, ends_at
        );
        Ok(period)
    }

    pub async fn active_until(&self, user_id: i64) -> Result<Option<DateTime<Utc>>, BillingError> {
        Ok(self.store.get_active_until(user_id).await?)
    }

    pub async fn periods_for_user(&self, user_id: i64) -> Result<Vec<SubscriptionPeriod>, BillingError> {
        Ok(self.store.get_all_by_user(user_id).await?)
    }

    /// The period bought with `link_id`, active or not.
    pub async fn period_for_payment(
        &self,
        user_id: i64,
        link_id: &str,
    ) -> Result<Option<SubscriptionPeriod>, BillingError> {
        Ok(self
            .periods_for_user(user_id)
            .await?
            .into_iter()
            .find(|p| p.payment_link_id == link_id))
    }

    pub async fn latest_ends(&self) -> Result<Vec<(i64, DateTime<Utc>)>, BillingError> {
        Ok(self.store.get_latest_ends().await?)
    }

    pub async fn deactivate_all(&self, user_id: i64) -> Result<u64, BillingError> {
        Ok(self.store.deactivate_by_user(user_id).await?)
    }

    pub async fn deactivate_for_payment(&self, link_id: &str) -> Result<u64, BillingError> {
        Ok(self.store.deactivate_by_payment(link_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use signalbot_db::memory::MemoryStore;
    use signalbot_db::models::NewPaymentRecord;
    use signalbot_db::repositories::{PaymentStore, UserStore};

    /// Ledger over a store where user 1 owns the given payment links.
    async fn ledger_with(links: &[&str]) -> SubscriptionLedger {
        let store = Arc::new(MemoryStore::new());
        store.upsert(1, None, 1).await.unwrap();
        for link in links {
            store
                .create(NewPaymentRecord {
                    link_id: link.to_string(),
                    user_id: 1,
                    plan_id: "bronze".into(),
                    amount: 199,
                    short_url: None,
                })
                .await
                .unwrap();
        }
        SubscriptionLedger::new(store)
    }

    #[tokio::test]
    async fn latest_end_wins_over_overlapping_periods() {
        let ledger = ledger_with(&["plink_a", "plink_b"]).await;
        let t0 = Utc::now();

        ledger
            .append_period(1, PlanId::Gold, t0, t0 + Duration::days(365), "plink_a")
            .await
            .unwrap();
        ledger
            .append_period(1, PlanId::Bronze, t0, t0 + Duration::days(30), "plink_b")
            .await
            .unwrap();

        assert_eq!(
            ledger.active_until(1).await.unwrap(),
            Some(t0 + Duration::days(365))
        );
        assert_eq!(ledger.active_until(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_non_positive_periods() {
        let ledger = ledger_with(&["plink_a"]).await;
        let t0 = Utc::now();
        assert!(matches!(
            ledger.append_period(1, PlanId::Gold, t0, t0, "plink_a").await,
            Err(BillingError::Store(DbError::InvalidPeriod))
        ));
        assert!(ledger.periods_for_user(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_period_per_payment() {
        let ledger = ledger_with(&["plink_a", "plink_b"]).await;
        let t0 = Utc::now();
        let end = t0 + Duration::days(30);

        ledger.append_period(1, PlanId::Bronze, t0, end, "plink_a").await.unwrap();
        assert!(matches!(
            ledger.append_period(1, PlanId::Bronze, t0, end, "plink_a").await,
            Err(BillingError::AlreadyFinalized(_))
        ));

        let found = ledger.period_for_payment(1, "plink_a").await.unwrap().unwrap();
        assert_eq!(found.ends_at, end);
        assert!(ledger.period_for_payment(1, "plink_b").await.unwrap().is_none());
    }
}
