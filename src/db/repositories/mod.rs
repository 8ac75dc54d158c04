use core::fmt;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Result as SqlxResult, Transaction};
use tracing::instrument;

use crate::db::models::user::{UserId, UserRecord};

pub mod conversation;
pub mod event;
pub mod user;

/// Scoped transaction handle. Multi-statement mutations (ledger append plus
/// balance update, promotion record plus level set) go through here so either
/// both rows land or neither does.
pub struct Tx<'a> {
    inner: Option<Transaction<'a, Postgres>>,
}

impl<'a> Tx<'a> {
    /// Runs `f` inside a transaction, committing on `Ok` and dropping the
    /// transaction (implicit rollback) on `Err`.
    #[instrument(skip(pool, f))]
    pub async fn with_tx<F, Fut, T>(pool: &'static Pool<Postgres>, f: F) -> SqlxResult<T>
    where
        F: FnOnce(Tx<'a>) -> Fut,
        Fut: Future<Output = (Tx<'a>, SqlxResult<T>)>,
    {
        let tx = Self::begin(pool).await?;
        let (mut tx, result) = f(tx).await;

        match result {
            Ok(val) => {
                tx.commit().await?;
                Ok(val)
            }
            Err(e) => {
                tracing::trace!(error = ?e, "transacted query failure");
                Err(e)
            }
        }
    }

    #[instrument(skip(pool))]
    pub async fn begin(pool: &'static Pool<Postgres>) -> SqlxResult<Self> {
        let inner = pool.begin().await?;
        Ok(Self { inner: Some(inner) })
    }

    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> SqlxResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.commit().await
        } else {
            Err(sqlx::Error::Protocol(
                "Transaction already completed".into(),
            ))
        }
    }

    #[instrument(skip(self))]
    pub async fn rollback(&mut self) -> SqlxResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.rollback().await
        } else {
            Err(sqlx::Error::Protocol(
                "Transaction already completed".into(),
            ))
        }
    }

    fn inner_mut(&mut self) -> SqlxResult<&mut Transaction<'a, Postgres>> {
        self.inner
            .as_mut()
            .ok_or_else(|| sqlx::Error::Protocol("Transaction already completed".into()))
    }

    #[instrument(skip(self, reason))]
    pub async fn insert_xp_event(
        &mut self,
        user_id: &UserId,
        amount: i64,
        reason: &str,
    ) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO xp_log (
                user_id,
                amount,
                reason,
                created_at
            )
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(reason)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }

    /// Atomic in-place balance update; the row-level write lock serializes
    /// concurrent grants for the same user. `None` when the user is unknown.
    #[instrument(skip(self))]
    pub async fn apply_xp_delta(
        &mut self,
        user_id: &UserId,
        amount: i64,
    ) -> SqlxResult<Option<(i64, i64)>> {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            UPDATE app_user
            SET total_xp = total_xp + $2,
                last_active = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING total_xp, current_level
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut **self.inner_mut()?)
        .await
    }

    /// Reads the user row under `FOR UPDATE` so a promotion gate check and the
    /// level write see a stable balance.
    #[instrument(skip(self))]
    pub async fn lock_user(&mut self, user_id: &UserId) -> SqlxResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM app_user WHERE id = $1 FOR UPDATE",
            sql_fragment::USER_FIELDS
        ))
        .bind(user_id)
        .fetch_optional(&mut **self.inner_mut()?)
        .await
    }

    #[instrument(skip(self, actor))]
    pub async fn insert_promotion_event(
        &mut self,
        user_id: &UserId,
        from_level: i64,
        to_level: i64,
        actor: &str,
    ) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO promotion_log (
                user_id,
                from_level,
                to_level,
                actor,
                created_at
            )
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(user_id)
        .bind(from_level)
        .bind(to_level)
        .bind(actor)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_level(&mut self, user_id: &UserId, level: i64) -> SqlxResult<()> {
        sqlx::query(
            r#"
            UPDATE app_user
            SET current_level = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(level)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }
}

pub mod sql_fragment {
    pub const USER_FIELDS: &str = r#"
        id,
        username,
        joined_at,
        current_level,
        total_xp,
        verification_status,
        social_url,
        builder_score,
        last_active,
        created_at,
        updated_at
    "#;
}

#[async_trait]
pub trait Repository {
    type Ident: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + Sync + fmt::Debug;
    type Output: for<'r> sqlx::FromRow<'r, <Postgres as sqlx::Database>::Row>
        + Sized
        + Unpin
        + Send
        + fmt::Debug;

    const BASE_FIELDS: &'static str;
    const TABLE_NAME: &'static str;

    fn new(pool: &'static Pool<Postgres>) -> Self
    where
        Self: Sized;

    fn pool(&self) -> &'static Pool<Postgres>;

    async fn exists(&self, id: &Self::Ident) -> SqlxResult<bool> {
        Ok(
            match sqlx::query_scalar::<_, bool>(&format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
                Self::TABLE_NAME
            ))
            .bind(id)
            .fetch_one(self.pool())
            .await
            {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = ?e, table = ?Self::TABLE_NAME, "failed to check row existence");
                    false
                }
            },
        )
    }

    #[instrument(skip(self, id))]
    async fn get_by_id(&self, id: &Self::Ident) -> SqlxResult<Option<Self::Output>> {
        sqlx::query_as::<_, Self::Output>(&format!(
            "SELECT {} FROM {} WHERE id = $1",
            Self::BASE_FIELDS,
            Self::TABLE_NAME
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
    }
}
