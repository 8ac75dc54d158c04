use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::user::UserId;

/// Append-only XP ledger row; one per grant, never mutated
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct XpEvent {
    pub id: i64,
    pub user_id: UserId,
    pub amount: i64,
    pub reason: String,
    pub created_at: NaiveDateTime,
}

/// Append-only promotion record; exactly one per successful promotion
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PromotionEvent {
    pub id: i64,
    pub user_id: UserId,
    pub from_level: i64,
    pub to_level: i64,
    pub actor: String,
    pub created_at: NaiveDateTime,
}
