//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signalbot_db::memory::MemoryStore;
use signalbot_db::models::{NewPaymentRecord, NewPeriod, PaymentRecord, PaymentStatus, SubscriptionPeriod};
use signalbot_db::repositories::{PaymentStore, SubscriptionStore, UserStore};
use signalbot_db::{DbError, DbResult};
use signalbot_shared::{Plan, PlanCatalog, PlanId};
use tokio::sync::Mutex;

use crate::error::BillingError;
use crate::services::ledger_service::SubscriptionLedger;
use crate::services::notification_service::{DispatchOptions, Dispatcher, Messenger};
use crate::services::payment::razorpay::RazorpayGateway;
use crate::services::payment::{
    CreatedLink, GatewayEvent, LinkRequest, LinkState, LinkStatus, PaymentGateway,
};
use crate::state::{AppState, Stores};

pub const ADMIN_ID: i64 = 1000;
pub const WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(i64, String)>>,
    failing: HashSet<i64>,
}

impl RecordingMessenger {
    pub fn failing_for(chats: impl IntoIterator<Item = i64>) -> Self {
        Self {
            sent: Mutex::default(),
            failing: chats.into_iter().collect(),
        }
    }

    pub async fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BillingError> {
        if self.failing.contains(&chat_id) {
            return Err(BillingError::DeliveryFailed {
                chat_id,
                reason: "bot was blocked by the user".into(),
            });
        }
        self.sent.lock().await.push((chat_id, text.to_string()));
        Ok(())
    }
}

/// Waits until at least `count` messages went out, or panics after 2s.
pub async fn wait_for_sent(messenger: &RecordingMessenger, count: usize) -> Vec<(i64, String)> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let sent = messenger.sent().await;
        if sent.len() >= count {
            return sent;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("expected {} message(s), got {:?}", count, sent);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Gateway with scripted link states. Signatures and payload parsing go
/// through the real Razorpay code.
pub struct FakeGateway {
    links: Mutex<HashMap<String, LinkStatus>>,
    requests: Mutex<Vec<LinkRequest>>,
    counter: AtomicU64,
    razorpay: RazorpayGateway,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            links: Mutex::default(),
            requests: Mutex::default(),
            counter: AtomicU64::new(1),
            razorpay: RazorpayGateway::new("rzp_test".into(), "key".into(), WEBHOOK_SECRET.into()),
        }
    }

    pub async fn set_status(&self, link_id: &str, status: LinkStatus) {
        self.links.lock().await.insert(link_id.to_string(), status);
    }

    pub async fn last_request(&self) -> Option<LinkRequest> {
        self.requests.lock().await.last().cloned()
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        self.razorpay.sign(payload)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_link(&self, request: &LinkRequest) -> Result<CreatedLink, BillingError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("plink_test{}", n);
        self.requests.lock().await.push(request.clone());
        self.set_status(
            &id,
            LinkStatus {
                state: LinkState::Created,
                amount_paid: 0,
                payment_id: None,
            },
        )
        .await;
        Ok(CreatedLink {
            short_url: format!("https://rzp.io/i/test{}", n),
            id,
        })
    }

    async fn fetch_link_status(&self, link_id: &str) -> Result<LinkStatus, BillingError> {
        self.links
            .lock()
            .await
            .get(link_id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(link_id.to_string()))
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<(), BillingError> {
        self.razorpay.verify_webhook_signature(payload, signature)
    }

    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, BillingError> {
        self.razorpay.parse_event(payload)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// bronze 199/30d, silver 499/90d, gold 1499/365d
pub fn test_catalog() -> PlanCatalog {
    PlanCatalog::new(vec![
        Plan::new(PlanId::Bronze, "Bronze", 199, 30),
        Plan::new(PlanId::Silver, "Silver", 499, 90),
        Plan::new(PlanId::Gold, "Gold", 1499, 365),
    ])
    .unwrap()
}

/// Period store whose first `append` fails as if the pool timed out.
pub struct FlakyPeriods {
    inner: Arc<MemoryStore>,
    failed: AtomicBool,
}

impl FlakyPeriods {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SubscriptionStore for FlakyPeriods {
    async fn append(&self, period: NewPeriod) -> DbResult<SubscriptionPeriod> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(DbError::Sqlx(signalbot_db::sqlx::Error::PoolTimedOut));
        }
        self.inner.append(period).await
    }

    async fn get_active_until(&self, user_id: i64) -> DbResult<Option<DateTime<Utc>>> {
        self.inner.get_active_until(user_id).await
    }

    async fn get_all_by_user(&self, user_id: i64) -> DbResult<Vec<SubscriptionPeriod>> {
        self.inner.get_all_by_user(user_id).await
    }

    async fn get_latest_ends(&self) -> DbResult<Vec<(i64, DateTime<Utc>)>> {
        self.inner.get_latest_ends().await
    }

    async fn deactivate_by_user(&self, user_id: i64) -> DbResult<u64> {
        self.inner.deactivate_by_user(user_id).await
    }

    async fn deactivate_by_payment(&self, link_id: &str) -> DbResult<u64> {
        self.inner.deactivate_by_payment(link_id).await
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub gateway: Arc<FakeGateway>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_catalog(test_catalog())
    }

    pub fn with_catalog(catalog: PlanCatalog) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::build(catalog, RecordingMessenger::default(), store.clone(), store)
    }

    pub fn with_failing_chats(chats: impl IntoIterator<Item = i64>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::build(test_catalog(), RecordingMessenger::failing_for(chats), store.clone(), store)
    }

    /// Periods go through `wrap(store)` instead of the memory store itself.
    pub fn with_periods(
        wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn SubscriptionStore>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let periods = wrap(store.clone());
        Self::build(test_catalog(), RecordingMessenger::default(), store, periods)
    }

    /// Same data, restarted with another catalog.
    pub fn reopen(&self, catalog: PlanCatalog) -> Self {
        Self::build(catalog, RecordingMessenger::default(), self.store.clone(), self.store.clone())
    }

    fn build(
        catalog: PlanCatalog,
        messenger: RecordingMessenger,
        store: Arc<MemoryStore>,
        periods: Arc<dyn SubscriptionStore>,
    ) -> Self {
        let messenger = Arc::new(messenger);
        let gateway = Arc::new(FakeGateway::new());
        let (dispatcher, _worker) = Dispatcher::spawn(
            messenger.clone(),
            DispatchOptions {
                concurrency: 4,
                interval: Duration::from_millis(1),
                queue_size: 64,
            },
        );
        let stores = Stores {
            users: store.clone(),
            payments: store.clone(),
            periods,
        };
        let state = AppState::new(catalog, stores, gateway.clone(), dispatcher, ADMIN_ID, "INR");
        Self {
            state,
            store,
            messenger,
            gateway,
        }
    }

    pub fn ledger(&self) -> SubscriptionLedger {
        SubscriptionLedger::new(self.store.clone())
    }

    /// Adds the user with their id as chat, unless already known.
    pub async fn seed_user(&self, user_id: i64) {
        if self.store.get_by_tg_id(user_id).await.unwrap().is_none() {
            self.store.upsert(user_id, None, user_id).await.unwrap();
        }
    }

    /// A `created` payment row, bypassing catalog checks.
    pub async fn seed_payment(&self, link_id: &str, user_id: i64, plan_id: &str, amount: i64) -> PaymentRecord {
        self.seed_user(user_id).await;
        self.store
            .create(NewPaymentRecord {
                link_id: link_id.to_string(),
                user_id,
                plan_id: plan_id.to_string(),
                amount,
                short_url: None,
            })
            .await
            .unwrap()
    }

    pub async fn seed_paid(&self, link_id: &str, user_id: i64, plan_id: &str, amount: i64) -> PaymentRecord {
        self.seed_payment(link_id, user_id, plan_id, amount).await;
        self.store
            .transition_status(
                link_id,
                PaymentStatus::Created,
                PaymentStatus::Paid,
                Some(&format!("pay_{}", link_id)),
            )
            .await
            .unwrap()
            .unwrap()
    }
}
