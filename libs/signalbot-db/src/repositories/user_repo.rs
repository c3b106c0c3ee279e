use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::User;
use crate::repositories::UserStore;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn upsert(&self, id: i64, display_name: Option<&str>, chat_id: i64) -> DbResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, display_name, chat_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                display_name = COALESCE(EXCLUDED.display_name, users.display_name),
                chat_id = EXCLUDED.chat_id,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(display_name)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_by_tg_id(&self, id: i64) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn set_banned(&self, id: i64, banned: bool) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_banned = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
        )
        .bind(banned)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_all(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }
}
