use std::sync::Arc;

use signalbot_db::models::User;
use signalbot_db::repositories::UserStore;
use tracing::info;

use crate::error::BillingError;

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Called on every inbound message: creates the user or refreshes name and chat.
    pub async fn touch(
        &self,
        tg_id: i64,
        display_name: Option<&str>,
        chat_id: i64,
    ) -> Result<User, BillingError> {
        Ok(self.store.upsert(tg_id, display_name, chat_id).await?)
    }

    pub async fn get(&self, tg_id: i64) -> Result<Option<User>, BillingError> {
        Ok(self.store.get_by_tg_id(tg_id).await?)
    }

    pub async fn set_banned(&self, tg_id: i64, banned: bool) -> Result<User, BillingError> {
        let user = self
            .store
            .set_banned(tg_id, banned)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("user {}", tg_id)))?;
        info!("User {} banned={}", tg_id, banned);
        Ok(user)
    }

    pub async fn is_banned(&self, tg_id: i64) -> Result<bool, BillingError> {
        Ok(self.get(tg_id).await?.is_some_and(|u| u.is_banned))
    }

    pub async fn all(&self) -> Result<Vec<User>, BillingError> {
        Ok(self.store.get_all().await?)
    }

    /// Where to reach the user. A private chat id equals the user id, so an
    /// unknown user still gets a usable address.
    pub async fn chat_for(&self, tg_id: i64) -> Result<i64, BillingError> {
        Ok(self.get(tg_id).await?.map(|u| u.chat_id).unwrap_or(tg_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalbot_db::memory::MemoryStore;

    #[tokio::test]
    async fn ban_requires_known_user() {
        let users = UserService::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            users.set_banned(9, true).await,
            Err(BillingError::NotFound(_))
        ));

        users.touch(9, Some("Nine"), 900).await.unwrap();
        assert!(users.set_banned(9, true).await.unwrap().is_banned);
        assert!(users.is_banned(9).await.unwrap());

        users.set_banned(9, false).await.unwrap();
        assert!(!users.is_banned(9).await.unwrap());
    }

    #[tokio::test]
    async fn chat_for_falls_back_to_user_id() {
        let users = UserService::new(Arc::new(MemoryStore::new()));
        assert_eq!(users.chat_for(5).await.unwrap(), 5);
        users.touch(5, None, 500).await.unwrap();
        assert_eq!(users.chat_for(5).await.unwrap(), 500);
    }
}
