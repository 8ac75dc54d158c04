use std::sync::LazyLock;

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::util::env;

pub mod models;
pub mod repositories;

pub mod prelude {
    pub use crate::db::StoreErr;
    pub use crate::db::models::conversation::Conversation;
    pub use crate::db::models::event::{PromotionEvent, XpEvent};
    pub use crate::db::models::user::{LeaderboardRow, UserId, UserRecord, VerificationStatus};
    pub use crate::db::models::{PaginatedResponse, Pagination};
    pub use crate::db::repositories::Repository; // + trait to provide base methods
    pub use crate::db::repositories::Tx;
    pub use crate::db::repositories::conversation::ConversationRepository;
    pub use crate::db::repositories::event::{PromotionLogRepository, XpLogRepository};
    pub use crate::db::repositories::user::UserRepository;
    pub use crate::db::{init, try_pool};
}

static STORE: LazyLock<OnceCell<Option<Db>>> = LazyLock::new(OnceCell::new);

/// Connects the store once during startup. A missing `DATABASE_URL` or a
/// failed connection degrades to memory-disabled mode instead of aborting;
/// callers observe that state as `None` from [`try_pool`].
pub async fn init() -> Option<&'static PgPool> {
    STORE
        .get_or_init(|| async { Db::connect_from_env().await })
        .await
        .as_ref()
        .map(|db| &db.pool)
}

/// Pool accessor for code running after [`init`]; `None` while the store is
/// unavailable.
pub fn try_pool() -> Option<&'static PgPool> {
    STORE
        .get()
        .and_then(|slot| slot.as_ref())
        .map(|db| &db.pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    async fn connect_from_env() -> Option<Self> {
        let url = match env::vars().await {
            Ok(vars) => vars.database_url.clone(),
            Err(e) => {
                tracing::error!(error = ?e, "env load failure during store init");
                return None;
            }
        };

        let Some(url) = url else {
            tracing::warn!("DATABASE_URL unset - running with memory disabled");
            return None;
        };

        match Self::connect(&url).await {
            Ok(db) => {
                tracing::info!("store connected");
                Some(db)
            }
            Err(e) => {
                tracing::warn!(error = ?e, "store unavailable - running with memory disabled");
                None
            }
        }
    }

    async fn connect(url: &str) -> StoreResult<Self> {
        let pool = sqlx::PgPool::connect(url).await?;
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }
}

pub type StoreResult<T> = core::result::Result<T, StoreErr>;

#[derive(Debug, Error)]
pub enum StoreErr {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    EnvError(#[from] env::EnvErr),
}
