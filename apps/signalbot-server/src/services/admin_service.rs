use signalbot_db::models::{PaymentRecord, User};
use tracing::{info, warn};

use crate::error::BillingError;
use crate::services::notification_service::Dispatcher;
use crate::services::payment_service::PaymentService;
use crate::services::subscription_service::{SubscriptionService, SubscriptionStatus};
use crate::services::user_service::UserService;
use crate::texts;

/// Operator actions shared by the bot's admin commands and the CLI.
#[derive(Clone)]
pub struct AdminService {
    users: UserService,
    payments: PaymentService,
    subscriptions: SubscriptionService,
    dispatcher: Dispatcher,
}

impl AdminService {
    pub fn new(
        users: UserService,
        payments: PaymentService,
        subscriptions: SubscriptionService,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            users,
            payments,
            subscriptions,
            dispatcher,
        }
    }

    pub async fn ban(&self, tg_id: i64) -> Result<User, BillingError> {
        self.users.set_banned(tg_id, true).await
    }

    pub async fn unban(&self, tg_id: i64) -> Result<User, BillingError> {
        self.users.set_banned(tg_id, false).await
    }

    /// Refunds the payment and tells the buyer what access they have left.
    pub async fn refund(&self, link_id: &str) -> Result<PaymentRecord, BillingError> {
        let record = self.payments.mark_refunded(link_id).await?;
        info!("Operator refunded {} for user {}", link_id, record.user_id);

        let until = match self.subscriptions.status_of(record.user_id).await? {
            SubscriptionStatus::Active { until } => Some(until),
            SubscriptionStatus::Unsubscribed => None,
        };
        let chat_id = self.users.chat_for(record.user_id).await?;
        if let Err(e) = self.dispatcher.deliver(chat_id, texts::refunded(link_id, until)).await {
            warn!("Refund notice for {} not delivered: {}", link_id, e);
        }
        Ok(record)
    }
}
