use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use super::sql_fragment;
use crate::db::models::user::{LeaderboardRow, UserId, UserRecord, VerificationStatus};
use crate::db::repositories::Repository;

#[derive(Debug)]
pub struct UserRepository {
    pool: &'static Pool<Postgres>,
}

#[async_trait::async_trait]
impl Repository for UserRepository {
    type Ident = UserId;
    type Output = UserRecord;

    const BASE_FIELDS: &'static str = sql_fragment::USER_FIELDS;
    const TABLE_NAME: &'static str = "app_user";

    fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &'static Pool<Postgres> {
        self.pool
    }
}

impl UserRepository {
    /// First-contact insert. `ON CONFLICT DO NOTHING` keeps this idempotent:
    /// re-registering an existing id never resets xp or level.
    #[instrument(skip(self, username))]
    pub async fn insert_new(&self, id: &UserId, username: &str) -> SqlxResult<()> {
        match sqlx::query(
            r#"
            INSERT INTO app_user (
                id,
                username,
                joined_at,
                current_level,
                total_xp,
                verification_status,
                builder_score,
                last_active,
                created_at,
                updated_at
            )
            VALUES ($1, $2, NOW(), 0, 0, 'pending', 0.5, NOW(), NOW(), NOW())
            ON CONFLICT (id)
            DO NOTHING
            "#,
        )
        .bind(id)
        .bind(username)
        .execute(self.pool)
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = ?e, "failure during user insertion");
                Err(e)
            }
        }
    }

    /// Blends one classifier sample into the stored builder score, weighted
    /// so a single message cannot swing the score to an extreme.
    #[instrument(skip(self))]
    pub async fn blend_builder_score(&self, id: &UserId, sample: f64) -> SqlxResult<Option<f64>> {
        sqlx::query_scalar::<_, f64>(
            r#"
            UPDATE app_user
            SET builder_score = builder_score * 0.8 + $2 * 0.2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING builder_score
            "#,
        )
        .bind(id)
        .bind(sample)
        .fetch_optional(self.pool)
        .await
    }

    #[instrument(skip(self, url))]
    pub async fn set_social_url(&self, id: &UserId, url: &str) -> SqlxResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE app_user
            SET social_url = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(url)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn set_verification(
        &self,
        id: &UserId,
        status: VerificationStatus,
    ) -> SqlxResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE app_user
            SET verification_status = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn leaderboard_page(
        &self,
        limit: i64,
        offset: i64,
    ) -> SqlxResult<Vec<LeaderboardRow>> {
        sqlx::query_as::<_, LeaderboardRow>(
            r#"
            SELECT
                id,
                username,
                total_xp,
                current_level,
                RANK() OVER (ORDER BY total_xp DESC, created_at ASC) AS ranking
            FROM app_user
            ORDER BY total_xp DESC, created_at ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM app_user")
            .fetch_one(self.pool)
            .await
    }
}
