use std::sync::Arc;

use chrono::{DateTime, Utc};
use signalbot_db::models::{PaymentRecord, SubscriptionPeriod};
use signalbot_shared::{Plan, PlanCatalog, PlanId};
use tracing::{info, instrument, warn};

use crate::error::BillingError;
use crate::services::ledger_service::SubscriptionLedger;
use crate::services::notification_service::Dispatcher;
use crate::services::user_service::UserService;
use crate::texts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active { until: DateTime<Utc> },
    Unsubscribed,
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active { .. })
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    catalog: Arc<PlanCatalog>,
    ledger: SubscriptionLedger,
    users: UserService,
    dispatcher: Dispatcher,
}

impl SubscriptionService {
    pub fn new(
        catalog: Arc<PlanCatalog>,
        ledger: SubscriptionLedger,
        users: UserService,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            catalog,
            ledger,
            users,
            dispatcher,
        }
    }

    pub async fn on_payment_confirmed(
        &self,
        record: &PaymentRecord,
    ) -> Result<SubscriptionPeriod, BillingError> {
        self.on_payment_confirmed_at(record, Utc::now()).await
    }

    /// Extends the buyer's subscription by the plan's duration, starting from
    /// whichever is later: `now` or the end of their current access.
    #[instrument(skip(self, record), fields(link_id = %record.link_id, user = record.user_id))]
    pub async fn on_payment_confirmed_at(
        &self,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionPeriod, BillingError> {
        let plan = record
            .plan_id
            .parse::<PlanId>()
            .ok()
            .and_then(|id| self.catalog.get(id))
            .ok_or_else(|| BillingError::UnknownPlan(record.plan_id.clone()))?;

        let base = match self.ledger.active_until(record.user_id).await? {
            Some(until) if until > now => until,
            _ => now,
        };

        let period = self
            .ledger
            .append_period(
                record.user_id,
                plan.id,
                base,
                base + plan.duration,
                &record.link_id,
            )
            .await?;

        info!(
            "User {} subscribed to {} until {}",
            record.user_id, plan.id, period.ends_at
        );
        self.notify_activated(record.user_id, plan, period.ends_at).await;

        Ok(period)
    }

    async fn notify_activated(&self, user_id: i64, plan: &Plan, until: DateTime<Utc>) {
        let chat_id = match self.users.chat_for(user_id).await {
            Ok(chat_id) => chat_id,
            Err(e) => {
                warn!("Falling back to user id as chat for {}: {}", user_id, e);
                user_id
            }
        };
        if let Err(e) = self
            .dispatcher
            .enqueue(chat_id, texts::subscription_activated(plan, until))
            .await
        {
            warn!("Could not queue activation notice for user {}: {}", user_id, e);
        }
    }

    pub async fn status_of(&self, user_id: i64) -> Result<SubscriptionStatus, BillingError> {
        self.status_of_at(user_id, Utc::now()).await
    }

    pub async fn status_of_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionStatus, BillingError> {
        Ok(match self.ledger.active_until(user_id).await? {
            Some(until) if until > now => SubscriptionStatus::Active { until },
            _ => SubscriptionStatus::Unsubscribed,
        })
    }

    /// Whether the user may receive signals right now. Banned users never are.
    pub async fn entitlement(&self, user_id: i64) -> Result<bool, BillingError> {
        self.entitlement_at(user_id, Utc::now()).await
    }

    pub async fn entitlement_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool, BillingError> {
        if self.users.is_banned(user_id).await? {
            return Ok(false);
        }
        Ok(self.status_of_at(user_id, now).await?.is_active())
    }

    pub async fn cancel(&self, user_id: i64) -> Result<u64, BillingError> {
        let ended = self.ledger.deactivate_all(user_id).await?;
        info!("User {} cancelled, {} period(s) ended", user_id, ended);
        Ok(ended)
    }

    /// Ends the period produced by a refunded payment.
    pub async fn revoke_payment(&self, link_id: &str) -> Result<u64, BillingError> {
        let ended = self.ledger.deactivate_for_payment(link_id).await?;
        if ended == 0 {
            warn!("Refunded payment {} had no active period", link_id);
        }
        Ok(ended)
    }

    pub async fn period_for_payment(
        &self,
        record: &PaymentRecord,
    ) -> Result<Option<SubscriptionPeriod>, BillingError> {
        self.ledger.period_for_payment(record.user_id, &record.link_id).await
    }

    pub async fn history(&self, user_id: i64) -> Result<Vec<SubscriptionPeriod>, BillingError> {
        self.ledger.periods_for_user(user_id).await
    }

    /// Users with an active period ending after `now`.
    pub async fn active_subscribers_at(&self, now: DateTime<Utc>) -> Result<Vec<i64>, BillingError> {
        Ok(self
            .ledger
            .latest_ends()
            .await?
            .into_iter()
            .filter(|(_, ends_at)| *ends_at > now)
            .map(|(user_id, _)| user_id)
            .collect())
    }
}
