use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::BillingError;
use crate::services::notification_service::{BroadcastReport, Dispatcher};
use crate::services::subscription_service::SubscriptionService;
use crate::services::user_service::UserService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Active,
    /// Everyone without current access, lapsed or never subscribed
    Expired,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Audience::All => "all",
            Audience::Active => "active",
            Audience::Expired => "expired",
        })
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Audience::All),
            "active" => Ok(Audience::Active),
            "expired" => Ok(Audience::Expired),
            other => Err(format!("unknown audience {:?}", other)),
        }
    }
}

#[derive(Clone)]
pub struct BroadcastService {
    users: UserService,
    subscriptions: SubscriptionService,
    dispatcher: Dispatcher,
}

impl BroadcastService {
    pub fn new(users: UserService, subscriptions: SubscriptionService, dispatcher: Dispatcher) -> Self {
        Self {
            users,
            subscriptions,
            dispatcher,
        }
    }

    /// Chat ids of non-banned users in the audience. `Active` means entitled
    /// to signals right now.
    pub async fn recipients_at(
        &self,
        audience: Audience,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, BillingError> {
        let users = self.users.all().await?;
        let mut recipients = Vec::new();

        match audience {
            Audience::All => {
                recipients.extend(users.iter().filter(|u| !u.is_banned).map(|u| u.chat_id));
            }
            Audience::Active => {
                for user in &users {
                    if self.subscriptions.entitlement_at(user.id, now).await? {
                        recipients.push(user.chat_id);
                    }
                }
            }
            Audience::Expired => {
                let active: HashSet<i64> = self
                    .subscriptions
                    .active_subscribers_at(now)
                    .await?
                    .into_iter()
                    .collect();
                recipients.extend(
                    users
                        .iter()
                        .filter(|u| !u.is_banned && !active.contains(&u.id))
                        .map(|u| u.chat_id),
                );
            }
        }

        Ok(recipients)
    }

    pub async fn broadcast(&self, audience: Audience, text: &str) -> Result<BroadcastReport, BillingError> {
        let recipients = self.recipients_at(audience, Utc::now()).await?;
        info!("Broadcasting to {} recipient(s) ({})", recipients.len(), audience);
        Ok(self.dispatcher.broadcast(&recipients, text).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use signalbot_shared::PlanId;

    use crate::testing::Harness;

    #[test]
    fn parses_audiences() {
        assert_eq!("ALL".parse::<Audience>().unwrap(), Audience::All);
        assert_eq!(" active ".parse::<Audience>().unwrap(), Audience::Active);
        assert!("everyone".parse::<Audience>().is_err());
    }

    #[tokio::test]
    async fn audiences_skip_banned_users() {
        let h = Harness::new();
        let now = Utc::now();
        for id in 1..=4 {
            h.state.users.touch(id, None, id * 10).await.unwrap();
        }
        h.state.users.set_banned(4, true).await.unwrap();
        h.seed_paid("plink_1", 1, "bronze", 199).await;
        h.seed_paid("plink_2", 2, "bronze", 199).await;
        h.seed_paid("plink_4", 4, "bronze", 199).await;
        h.ledger()
            .append_period(4, PlanId::Bronze, now, now + Duration::days(30), "plink_4")
            .await
            .unwrap();
        h.ledger()
            .append_period(1, PlanId::Bronze, now, now + Duration::days(30), "plink_1")
            .await
            .unwrap();
        h.ledger()
            .append_period(2, PlanId::Bronze, now - Duration::days(60), now - Duration::days(30), "plink_2")
            .await
            .unwrap();

        let sorted = |mut v: Vec<i64>| {
            v.sort();
            v
        };
        let broadcasts = &h.state.broadcasts;
        assert_eq!(
            sorted(broadcasts.recipients_at(Audience::All, now).await.unwrap()),
            vec![10, 20, 30]
        );
        assert_eq!(
            broadcasts.recipients_at(Audience::Active, now).await.unwrap(),
            vec![10]
        );
        assert_eq!(
            sorted(broadcasts.recipients_at(Audience::Expired, now).await.unwrap()),
            vec![20, 30]
        );
    }

    #[tokio::test]
    async fn broadcast_counts_failed_deliveries() {
        let h = Harness::with_failing_chats([20]);
        for id in 1..=3 {
            h.state.users.touch(id, None, id * 10).await.unwrap();
        }

        let report = h.state.broadcasts.broadcast(Audience::All, "📈 Signal").await.unwrap();
        assert_eq!(report, BroadcastReport { succeeded: 2, failed: 1 });
    }
}
