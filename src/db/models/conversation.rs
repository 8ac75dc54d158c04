use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::user::UserId;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub message: String,
    pub response: String,
    pub source: String,
    pub created_at: NaiveDateTime,
}
