//! In-process store used by tests. Not durable; never wire it into `serve`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{DbError, DbResult};
use crate::models::{NewPaymentRecord, NewPeriod, PaymentRecord, PaymentStatus, SubscriptionPeriod, User};
use crate::repositories::{PaymentStore, SubscriptionStore, UserStore};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<i64, User>,
    payments: HashMap<String, PaymentRecord>,
    periods: Vec<SubscriptionPeriod>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert(&self, id: i64, display_name: Option<&str>, chat_id: i64) -> DbResult<User> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let user = tables.users.entry(id).or_insert_with(|| User {
            id,
            display_name: None,
            chat_id,
            is_banned: false,
            created_at: now,
            updated_at: now,
        });
        if let Some(name) = display_name {
            user.display_name = Some(name.to_string());
        }
        user.chat_id = chat_id;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn get_by_tg_id(&self, id: i64) -> DbResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn set_banned(&self, id: i64, banned: bool) -> DbResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.is_banned = banned;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn get_all(&self) -> DbResult<Vec<User>> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create(&self, record: NewPaymentRecord) -> DbResult<PaymentRecord> {
        let mut tables = self.tables.lock().await;
        if tables.payments.contains_key(&record.link_id) {
            return Err(DbError::Conflict(format!("payment {}", record.link_id)));
        }
        if !tables.users.contains_key(&record.user_id) {
            return Err(DbError::MissingReference(format!("user {}", record.user_id)));
        }
        let now = Utc::now();
        let rec = PaymentRecord {
            link_id: record.link_id.clone(),
            user_id: record.user_id,
            plan_id: record.plan_id,
            amount: record.amount,
            status: PaymentStatus::Created,
            gateway_payment_id: None,
            short_url: record.short_url,
            created_at: now,
            updated_at: now,
        };
        tables.payments.insert(record.link_id, rec.clone());
        Ok(rec)
    }

    async fn get_by_link_id(&self, link_id: &str) -> DbResult<Option<PaymentRecord>> {
        Ok(self.tables.lock().await.payments.get(link_id).cloned())
    }

    async fn transition_status(
        &self,
        link_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        gateway_payment_id: Option<&str>,
    ) -> DbResult<Option<PaymentRecord>> {
        let mut tables = self.tables.lock().await;
        let Some(rec) = tables.payments.get_mut(link_id) else {
            return Ok(None);
        };
        if rec.status != from {
            return Ok(None);
        }
        rec.status = to;
        if let Some(id) = gateway_payment_id {
            rec.gateway_payment_id = Some(id.to_string());
        }
        rec.updated_at = Utc::now();
        Ok(Some(rec.clone()))
    }

    async fn get_latest_pending_by_user(&self, user_id: i64) -> DbResult<Option<PaymentRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .values()
            .filter(|p| p.user_id == user_id && p.status == PaymentStatus::Created)
            .max_by_key(|p| p.created_at)
            .cloned())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn append(&self, period: NewPeriod) -> DbResult<SubscriptionPeriod> {
        if period.ends_at <= period.starts_at {
            return Err(DbError::InvalidPeriod);
        }
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&period.user_id) {
            return Err(DbError::MissingReference(format!("user {}", period.user_id)));
        }
        if !tables.payments.contains_key(&period.payment_link_id) {
            return Err(DbError::MissingReference(format!(
                "payment {}",
                period.payment_link_id
            )));
        }
        if tables
            .periods
            .iter()
            .any(|p| p.payment_link_id == period.payment_link_id)
        {
            return Err(DbError::Conflict(format!(
                "period for payment {}",
                period.payment_link_id
            )));
        }
        let rec = SubscriptionPeriod {
            id: tables.periods.len() as i64 + 1,
            user_id: period.user_id,
            plan_id: period.plan_id,
            starts_at: period.starts_at,
            ends_at: period.ends_at,
            active: true,
            payment_link_id: period.payment_link_id,
            created_at: Utc::now(),
        };
        tables.periods.push(rec.clone());
        Ok(rec)
    }

    async fn get_active_until(&self, user_id: i64) -> DbResult<Option<DateTime<Utc>>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .periods
            .iter()
            .filter(|p| p.user_id == user_id && p.active)
            .map(|p| p.ends_at)
            .max())
    }

    async fn get_all_by_user(&self, user_id: i64) -> DbResult<Vec<SubscriptionPeriod>> {
        let tables = self.tables.lock().await;
        let mut periods: Vec<SubscriptionPeriod> = tables
            .periods
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        periods.sort_by_key(|p| (p.starts_at, p.id));
        Ok(periods)
    }

    async fn get_latest_ends(&self) -> DbResult<Vec<(i64, DateTime<Utc>)>> {
        let tables = self.tables.lock().await;
        let mut latest: HashMap<i64, DateTime<Utc>> = HashMap::new();
        for p in tables.periods.iter().filter(|p| p.active) {
            latest
                .entry(p.user_id)
                .and_modify(|end| *end = (*end).max(p.ends_at))
                .or_insert(p.ends_at);
        }
        Ok(latest.into_iter().collect())
    }

    async fn deactivate_by_user(&self, user_id: i64) -> DbResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut changed = 0;
        for p in tables.periods.iter_mut().filter(|p| p.user_id == user_id && p.active) {
            p.active = false;
            changed += 1;
        }
        Ok(changed)
    }

    async fn deactivate_by_payment(&self, link_id: &str) -> DbResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut changed = 0;
        for p in tables
            .periods
            .iter_mut()
            .filter(|p| p.payment_link_id == link_id && p.active)
        {
            p.active = false;
            changed += 1;
        }
        Ok(changed)
    }
}
