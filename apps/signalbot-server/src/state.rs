use std::sync::Arc;

use signalbot_db::repositories::{
    PaymentRepository, PaymentStore, SubscriptionRepository, SubscriptionStore, UserRepository,
    UserStore,
};
use signalbot_db::sqlx::PgPool;
use signalbot_shared::PlanCatalog;

use crate::services::admin_service::AdminService;
use crate::services::alert_service::AlertService;
use crate::services::broadcast_service::BroadcastService;
use crate::services::ledger_service::SubscriptionLedger;
use crate::services::notification_service::Dispatcher;
use crate::services::payment::PaymentGateway;
use crate::services::payment_service::PaymentService;
use crate::services::subscription_service::SubscriptionService;
use crate::services::user_service::UserService;

pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub periods: Arc<dyn SubscriptionStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            payments: Arc::new(PaymentRepository::new(pool.clone())),
            periods: Arc::new(SubscriptionRepository::new(pool)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<PlanCatalog>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub users: UserService,
    pub subscriptions: SubscriptionService,
    pub payments: PaymentService,
    pub broadcasts: BroadcastService,
    pub admin: AdminService,
    pub admin_id: i64,
}

impl AppState {
    pub fn new(
        catalog: PlanCatalog,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Dispatcher,
        admin_id: i64,
        currency: &str,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let users = UserService::new(stores.users);
        let ledger = SubscriptionLedger::new(stores.periods);
        let alerts = AlertService::new(admin_id, dispatcher.clone());
        let subscriptions = SubscriptionService::new(
            catalog.clone(),
            ledger,
            users.clone(),
            dispatcher.clone(),
        );
        let payments = PaymentService::new(
            catalog.clone(),
            stores.payments,
            gateway.clone(),
            subscriptions.clone(),
            alerts,
            currency,
        );
        let broadcasts = BroadcastService::new(users.clone(), subscriptions.clone(), dispatcher.clone());
        let admin = AdminService::new(users.clone(), payments.clone(), subscriptions.clone(), dispatcher);

        Self {
            catalog,
            gateway,
            users,
            subscriptions,
            payments,
            broadcasts,
            admin,
            admin_id,
        }
    }

    pub fn is_admin(&self, tg_id: i64) -> bool {
        tg_id == self.admin_id
    }
}
