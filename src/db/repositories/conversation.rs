use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use crate::db::models::conversation::Conversation;
use crate::db::models::user::UserId;

pub struct ConversationRepository {
    pool: &'static Pool<Postgres>,
}

impl ConversationRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, message, response))]
    pub async fn insert(
        &self,
        user_id: Option<&UserId>,
        message: &str,
        response: &str,
        source: &str,
    ) -> SqlxResult<()> {
        match sqlx::query(
            r#"
            INSERT INTO conversation (
                user_id,
                message,
                response,
                source,
                created_at
            )
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(user_id.map(|id| id.0.clone()))
        .bind(message)
        .bind(response)
        .bind(source)
        .execute(self.pool)
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = ?e, "failure during conversation insertion");
                Err(e)
            }
        }
    }

    /// Recent exchanges, newest first; scoped to one user when an id is given
    #[instrument(skip(self))]
    pub async fn recent(
        &self,
        user_id: Option<&UserId>,
        limit: i64,
    ) -> SqlxResult<Vec<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, message, response, source, created_at
            FROM conversation
            WHERE ($1::TEXT IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.map(|id| id.0.clone()))
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM conversation")
            .fetch_one(self.pool)
            .await
    }
}
