use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use crate::db::models::event::{PromotionEvent, XpEvent};
use crate::db::models::user::UserId;

/// Read side of the XP ledger; writes happen inside engine transactions via
/// [`crate::db::repositories::Tx`].
pub struct XpLogRepository {
    pool: &'static Pool<Postgres>,
}

impl XpLogRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: i64,
    ) -> SqlxResult<Vec<XpEvent>> {
        sqlx::query_as::<_, XpEvent>(
            r#"
            SELECT id, user_id, amount, reason, created_at
            FROM xp_log
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn total_for_user(&self, user_id: &UserId) -> SqlxResult<i64> {
        // SUM(BIGINT) comes back NUMERIC, hence the cast
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM xp_log WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await
    }
}

pub struct PromotionLogRepository {
    pool: &'static Pool<Postgres>,
}

impl PromotionLogRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: i64,
    ) -> SqlxResult<Vec<PromotionEvent>> {
        sqlx::query_as::<_, PromotionEvent>(
            r#"
            SELECT id, user_id, from_level, to_level, actor, created_at
            FROM promotion_log
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }
}
