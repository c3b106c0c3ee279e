use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use signalbot_db::DbError;
use signalbot_db::models::{NewPaymentRecord, PaymentRecord, PaymentStatus, SubscriptionPeriod};
use signalbot_db::repositories::PaymentStore;
use signalbot_shared::{PaymentNotes, PlanCatalog};
use tracing::{info, instrument, warn};

use crate::error::BillingError;
use crate::services::alert_service::AlertService;
use crate::services::payment::{GatewayEvent, LinkRequest, LinkState, PaymentGateway};
use crate::services::subscription_service::SubscriptionService;

/// Outcome of a pull-based check on a payment link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkVerification {
    Paid(PaymentRecord),
    NotYetPaid,
    Unknown,
    Failed(PaymentRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Confirmed {
        link_id: String,
        until: DateTime<Utc>,
    },
    Failed(String),
    /// Redelivery of something already applied
    Duplicate(String),
    Ignored(String),
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Confirmed { .. } => "confirmed",
            WebhookOutcome::Failed(_) => "failed",
            WebhookOutcome::Duplicate(_) => "duplicate",
            WebhookOutcome::Ignored(_) => "ignored",
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    catalog: Arc<PlanCatalog>,
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    subscriptions: SubscriptionService,
    alerts: AlertService,
    currency: String,
}

impl PaymentService {
    pub fn new(
        catalog: Arc<PlanCatalog>,
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        subscriptions: SubscriptionService,
        alerts: AlertService,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            store,
            gateway,
            subscriptions,
            alerts,
            currency: currency.into(),
        }
    }

    pub async fn create_record(
        &self,
        user_id: i64,
        plan_id: &str,
        amount: i64,
        link_id: &str,
        short_url: Option<&str>,
    ) -> Result<PaymentRecord, BillingError> {
        let plan = self.catalog.lookup(plan_id)?;
        if amount != plan.price {
            let err = BillingError::AmountMismatch {
                plan: plan.id.to_string(),
                expected: plan.price,
                actual: amount,
            };
            self.alerts
                .raise(&err, &format!("creating payment {} for user {}", link_id, user_id))
                .await;
            return Err(err);
        }

        let record = self
            .store
            .create(NewPaymentRecord {
                link_id: link_id.to_string(),
                user_id,
                plan_id: plan.id.as_str().to_string(),
                amount,
                short_url: short_url.map(str::to_string),
            })
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => BillingError::DuplicateLinkId(link_id.to_string()),
                other => other.into(),
            })?;

        info!(
            "Payment {} created: user {} plan {} amount {}",
            record.link_id, user_id, plan.id, amount
        );
        Ok(record)
    }

    /// One atomic check-and-set; the loser of a race sees `AlreadyFinalized`.
    async fn transition(
        &self,
        link_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        gateway_payment_id: Option<&str>,
    ) -> Result<PaymentRecord, BillingError> {
        if !from.can_transition_to(to) {
            return Err(BillingError::InvalidTransition {
                link_id: link_id.to_string(),
                status: from,
            });
        }
        if let Some(record) = self
            .store
            .transition_status(link_id, from, to, gateway_payment_id)
            .await?
        {
            return Ok(record);
        }

        match self.store.get_by_link_id(link_id).await? {
            None => Err(BillingError::NotFound(link_id.to_string())),
            // Only a refund can find the record still in `created`
            Some(record) if record.status == PaymentStatus::Created => {
                Err(BillingError::InvalidTransition {
                    link_id: link_id.to_string(),
                    status: record.status,
                })
            }
            Some(_) => Err(BillingError::AlreadyFinalized(link_id.to_string())),
        }
    }

    pub async fn mark_paid(
        &self,
        link_id: &str,
        gateway_payment_id: &str,
    ) -> Result<PaymentRecord, BillingError> {
        let record = self
            .transition(
                link_id,
                PaymentStatus::Created,
                PaymentStatus::Paid,
                Some(gateway_payment_id),
            )
            .await?;
        info!("Payment {} marked paid ({})", link_id, gateway_payment_id);
        Ok(record)
    }

    pub async fn mark_failed(&self, link_id: &str) -> Result<PaymentRecord, BillingError> {
        let record = self
            .transition(link_id, PaymentStatus::Created, PaymentStatus::Failed, None)
            .await?;
        info!("Payment {} marked failed", link_id);
        Ok(record)
    }

    /// paid -> refunded, and the access bought with it ends.
    pub async fn mark_refunded(&self, link_id: &str) -> Result<PaymentRecord, BillingError> {
        let record = self
            .transition(link_id, PaymentStatus::Paid, PaymentStatus::Refunded, None)
            .await?;
        self.subscriptions.revoke_payment(link_id).await?;
        info!("Payment {} refunded", link_id);
        Ok(record)
    }

    pub async fn get(&self, link_id: &str) -> Result<Option<PaymentRecord>, BillingError> {
        Ok(self.store.get_by_link_id(link_id).await?)
    }

    pub async fn latest_pending_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<PaymentRecord>, BillingError> {
        Ok(self.store.get_latest_pending_by_user(user_id).await?)
    }

    /// Creates a gateway payment link for the plan and records it as `created`.
    #[instrument(skip(self))]
    pub async fn start_checkout(&self, user_id: i64, plan_id: &str) -> Result<PaymentRecord, BillingError> {
        let plan = self.catalog.lookup(plan_id)?.clone();

        let link = self
            .gateway
            .create_payment_link(&LinkRequest {
                amount: plan.price,
                currency: self.currency.clone(),
                description: format!("{} plan, {} days", plan.name, plan.duration_days()),
                notes: PaymentNotes::new(user_id, plan.id),
            })
            .await?;

        self.create_record(
            user_id,
            plan.id.as_str(),
            plan.price,
            &link.id,
            Some(&link.short_url),
        )
        .await
    }

    /// `mark_paid` followed by the subscription extension. Runs at most once
    /// per record no matter how many paths race on it.
    pub async fn confirm_payment(
        &self,
        link_id: &str,
        gateway_payment_id: &str,
    ) -> Result<(PaymentRecord, SubscriptionPeriod), BillingError> {
        let record = self.mark_paid(link_id, gateway_payment_id).await?;
        let period = self.grant_access(&record).await?;
        Ok((record, period))
    }

    /// Appends the period a paid record is owed. Failures are raised to the operator.
    async fn grant_access(&self, record: &PaymentRecord) -> Result<SubscriptionPeriod, BillingError> {
        match self.subscriptions.on_payment_confirmed(record).await {
            Ok(period) => Ok(period),
            // Another path appended it first
            Err(e @ BillingError::AlreadyFinalized(_)) => Err(e),
            Err(e) => {
                self.alerts
                    .raise(
                        &e,
                        &format!(
                            "payment {} by user {} is paid but no access was granted",
                            record.link_id, record.user_id
                        ),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Finishes a confirmation that stopped between `mark_paid` and the
    /// period append. Returns the period only if this call created it.
    async fn resume_confirmation(&self, link_id: &str) -> Result<Option<SubscriptionPeriod>, BillingError> {
        let Some(record) = self.get(link_id).await? else {
            return Ok(None);
        };
        if record.status != PaymentStatus::Paid
            || self.subscriptions.period_for_payment(&record).await?.is_some()
        {
            return Ok(None);
        }

        warn!("Payment {} is paid without a period, granting access now", link_id);
        match self.grant_access(&record).await {
            Ok(period) => Ok(Some(period)),
            Err(BillingError::AlreadyFinalized(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Pull-based confirmation for users whose webhook has not arrived.
    #[instrument(skip(self))]
    pub async fn verify_link(&self, link_id: &str) -> Result<LinkVerification, BillingError> {
        let Some(record) = self.get(link_id).await? else {
            return Ok(LinkVerification::Unknown);
        };
        if record.status == PaymentStatus::Paid {
            return self.reread(link_id).await;
        }
        if record.status != PaymentStatus::Created {
            return Ok(settled(record));
        }

        let status = self.gateway.fetch_link_status(link_id).await?;
        match status.state {
            LinkState::Paid => {
                let Some(payment_id) = status.payment_id else {
                    warn!("Link {} reported paid without a captured payment", link_id);
                    return Ok(LinkVerification::NotYetPaid);
                };
                if status.amount_paid != record.amount {
                    return Err(self.amount_mismatch(&record, status.amount_paid).await);
                }
                match self.confirm_payment(link_id, &payment_id).await {
                    Ok((record, _)) => Ok(LinkVerification::Paid(record)),
                    Err(BillingError::AlreadyFinalized(_)) => self.reread(link_id).await,
                    Err(e) => Err(e),
                }
            }
            state if state.is_closed() => match self.mark_failed(link_id).await {
                Ok(record) => Ok(LinkVerification::Failed(record)),
                Err(BillingError::AlreadyFinalized(_)) => self.reread(link_id).await,
                Err(e) => Err(e),
            },
            _ => Ok(LinkVerification::NotYetPaid),
        }
    }

    /// Settles on whatever the record says now, repairing a paid record that
    /// never got its period.
    async fn reread(&self, link_id: &str) -> Result<LinkVerification, BillingError> {
        self.resume_confirmation(link_id).await?;
        Ok(match self.get(link_id).await? {
            Some(record) => settled(record),
            None => LinkVerification::Unknown,
        })
    }

    async fn amount_mismatch(&self, record: &PaymentRecord, actual: i64) -> BillingError {
        let err = BillingError::AmountMismatch {
            plan: record.plan_id.clone(),
            expected: record.amount,
            actual,
        };
        self.alerts
            .raise(&err, &format!("payment {} by user {}", record.link_id, record.user_id))
            .await;
        err
    }

    /// Applies a verified gateway event.
    #[instrument(skip(self, event))]
    pub async fn handle_event(&self, event: GatewayEvent) -> Result<WebhookOutcome, BillingError> {
        match event {
            GatewayEvent::LinkPaid {
                link_id,
                payment_id,
                amount_paid,
                notes,
            } => self.handle_paid(link_id, payment_id, amount_paid, &notes).await,
            GatewayEvent::LinkClosed { link_id, state } => match self.mark_failed(&link_id).await {
                Ok(_) => {
                    info!("Payment link {} closed ({:?})", link_id, state);
                    Ok(WebhookOutcome::Failed(link_id))
                }
                Err(BillingError::AlreadyFinalized(_)) => Ok(WebhookOutcome::Duplicate(link_id)),
                Err(BillingError::NotFound(_)) => Ok(WebhookOutcome::Ignored(link_id)),
                Err(e) => Err(e),
            },
            GatewayEvent::Ignored(event) => {
                info!("Ignoring webhook event {}", event);
                Ok(WebhookOutcome::Ignored(event))
            }
        }
    }

    async fn handle_paid(
        &self,
        link_id: String,
        payment_id: String,
        amount_paid: i64,
        notes: &Value,
    ) -> Result<WebhookOutcome, BillingError> {
        let notes = PaymentNotes::from_value(notes)?;

        let Some(record) = self.get(&link_id).await? else {
            warn!("Webhook for unknown payment link {}", link_id);
            return Ok(WebhookOutcome::Ignored(link_id));
        };

        if notes.telegram_id != record.user_id || notes.plan.as_str() != record.plan_id {
            let err = BillingError::NotesMismatch(link_id.clone());
            self.alerts
                .raise(
                    &err,
                    &format!(
                        "notes say user {} plan {}, record says user {} plan {}",
                        notes.telegram_id, notes.plan, record.user_id, record.plan_id
                    ),
                )
                .await;
            return Err(err);
        }
        if record.status == PaymentStatus::Created && amount_paid != record.amount {
            return Err(self.amount_mismatch(&record, amount_paid).await);
        }

        match self.confirm_payment(&link_id, &payment_id).await {
            Ok((_, period)) => Ok(WebhookOutcome::Confirmed {
                link_id,
                until: period.ends_at,
            }),
            Err(BillingError::AlreadyFinalized(_)) => match self.resume_confirmation(&link_id).await? {
                Some(period) => Ok(WebhookOutcome::Confirmed {
                    link_id,
                    until: period.ends_at,
                }),
                None => {
                    info!("Duplicate delivery for payment {}", link_id);
                    Ok(WebhookOutcome::Duplicate(link_id))
                }
            },
            Err(e) => Err(e),
        }
    }
}

fn settled(record: PaymentRecord) -> LinkVerification {
    match record.status {
        PaymentStatus::Paid | PaymentStatus::Refunded => LinkVerification::Paid(record),
        PaymentStatus::Failed => LinkVerification::Failed(record),
        PaymentStatus::Created => LinkVerification::NotYetPaid,
    }
}
