//! Store interfaces and their Postgres implementations.
//!
//! Services only ever see the traits, so the same logic runs against
//! Postgres in production and [`crate::memory::MemoryStore`] in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbResult;
use crate::models::{NewPaymentRecord, NewPeriod, PaymentRecord, PaymentStatus, SubscriptionPeriod, User};

pub mod payment_repo;
pub mod subscription_repo;
pub mod user_repo;

pub use payment_repo::PaymentRepository;
pub use subscription_repo::SubscriptionRepository;
pub use user_repo::UserRepository;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the user on first contact, otherwise refreshes name and chat.
    /// A `None` display name keeps the stored one.
    async fn upsert(&self, id: i64, display_name: Option<&str>, chat_id: i64) -> DbResult<User>;

    async fn get_by_tg_id(&self, id: i64) -> DbResult<Option<User>>;

    /// Returns `None` if the user has never contacted the bot.
    async fn set_banned(&self, id: i64, banned: bool) -> DbResult<Option<User>>;

    async fn get_all(&self) -> DbResult<Vec<User>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Fails with [`crate::DbError::Conflict`] if the link id is taken.
    async fn create(&self, record: NewPaymentRecord) -> DbResult<PaymentRecord>;

    async fn get_by_link_id(&self, link_id: &str) -> DbResult<Option<PaymentRecord>>;

    /// Moves the record from `from` to `to` in one atomic step. Returns
    /// `None` when there is no record for `link_id` currently in `from`.
    async fn transition_status(
        &self,
        link_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        gateway_payment_id: Option<&str>,
    ) -> DbResult<Option<PaymentRecord>>;

    async fn get_latest_pending_by_user(&self, user_id: i64) -> DbResult<Option<PaymentRecord>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Fails with [`crate::DbError::Conflict`] if the payment already produced a period.
    async fn append(&self, period: NewPeriod) -> DbResult<SubscriptionPeriod>;

    /// Latest `ends_at` among the user's active periods.
    async fn get_active_until(&self, user_id: i64) -> DbResult<Option<DateTime<Utc>>>;

    async fn get_all_by_user(&self, user_id: i64) -> DbResult<Vec<SubscriptionPeriod>>;

    /// `(user_id, latest active ends_at)` for every user with an active period.
    async fn get_latest_ends(&self) -> DbResult<Vec<(i64, DateTime<Utc>)>>;

    async fn deactivate_by_user(&self, user_id: i64) -> DbResult<u64>;

    async fn deactivate_by_payment(&self, link_id: &str) -> DbResult<u64>;
}
