use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Json, debug_handler};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use crate::api::server::{AppState, JsonResult, RouteError};
use crate::chat::{ChatReply, ChatRequest};
use crate::db::prelude::*;
use crate::levels;
use crate::progression::{ProgressionEngine, PromotionOutcome, XpOutcome};

#[instrument]
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "Verdant API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/chat", "/status", "/history", "/leaderboard", "/xp/history"],
        "documentation": "POST /chat with {\"message\": \"your message\"}",
    }))
}

#[instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let backends: Value = state
        .orchestrator
        .backend_status()
        .into_iter()
        .map(|(label, configured)| {
            (
                label.to_string(),
                Value::from(if configured { "configured" } else { "disabled" }),
            )
        })
        .collect::<serde_json::Map<_, _>>()
        .into();

    Json(json!({
        "status": "alive",
        "service": "Verdant API",
        "store": if state.pool.is_some() { "connected" } else { "disabled" },
        "chat_mode": if state.orchestrator.has_providers() { "llm" } else { "fallback-only" },
        "backends": backends,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[instrument(skip(state))]
pub async fn status(State(state): State<Arc<AppState>>) -> JsonResult<Value> {
    let conversations = match state.pool {
        Some(pool) => ConversationRepository::new(pool).count().await?,
        None => 0,
    };

    let backends: Value = state
        .orchestrator
        .backend_status()
        .into_iter()
        .map(|(label, configured)| {
            (
                label.to_string(),
                Value::from(if configured { "ready" } else { "not configured" }),
            )
        })
        .collect::<serde_json::Map<_, _>>()
        .into();

    Ok(Json(json!({
        "verdant": "online",
        "store": if state.pool.is_some() { "connected" } else { "disabled" },
        "conversations": conversations,
        "ai_backends": backends,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[instrument(skip(state, req))]
#[debug_handler]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> JsonResult<ChatReply> {
    if req.message.trim().is_empty() {
        return Err(RouteError::Validation("message".to_string()));
    }

    let reply = state.orchestrator.respond(&req, None).await;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub user_id: Option<String>,
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

#[inline]
const fn default_history_limit() -> i64 {
    10
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> JsonResult<Value> {
    let conversations = match state.pool {
        Some(pool) => {
            let user_id = params.user_id.as_deref().map(UserId::from);
            ConversationRepository::new(pool)
                .recent(user_id.as_ref(), params.limit)
                .await?
        }
        // memory disabled is not an error for reads; callers get nothing back
        None => Vec::new(),
    };

    Ok(Json(json!({
        "count": conversations.len(),
        "conversations": conversations,
    })))
}

#[derive(Debug, Deserialize)]
pub struct XpHistoryParams {
    pub user_id: String,
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

/// Recent ledger activity for one user: xp grants, promotions, and the
/// ledger's own sum as a consistency cross-check against `total_xp`
#[instrument(skip(state))]
pub async fn xp_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<XpHistoryParams>,
) -> JsonResult<Value> {
    if params.user_id.trim().is_empty() {
        return Err(RouteError::Validation("user_id".to_string()));
    }

    let Some(pool) = state.pool else {
        return Ok(Json(json!({
            "grants": [],
            "promotions": [],
            "ledger_total": 0,
        })));
    };

    let user_id = UserId::from(params.user_id.as_str());

    let grants = XpLogRepository::new(pool)
        .recent_for_user(&user_id, params.limit)
        .await?;
    let promotions = PromotionLogRepository::new(pool)
        .recent_for_user(&user_id, params.limit)
        .await?;
    let ledger_total = XpLogRepository::new(pool).total_for_user(&user_id).await?;

    Ok(Json(json!({
        "grants": grants,
        "promotions": promotions,
        "ledger_total": ledger_total,
    })))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(param): Query<Pagination>,
) -> JsonResult<PaginatedResponse<LeaderboardRow>> {
    let Some(pool) = state.pool else {
        return Ok(Json(PaginatedResponse::new(Vec::new(), 0, param.limit, 0)));
    };

    let limit = param.limit;
    let offset = param.page * limit;

    let repo = UserRepository::new(pool);
    let rows = repo.leaderboard_page(limit, offset).await?;
    let total = repo.count().await?;

    Ok(Json(PaginatedResponse::new(rows, total, limit, param.page)))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub user_id: String,
    pub username: Option<String>,
    pub amount: i64,
    #[serde(default = "default_grant_reason")]
    pub reason: String,
}

#[inline]
fn default_grant_reason() -> String {
    String::from("manual award")
}

#[derive(Debug, Serialize)]
pub struct GrantReply {
    pub outcome: XpOutcome,
    pub promotion: Option<PromotionOutcome>,
}

/// Service-to-service grant path, internal-token gated. Mirrors the moderator
/// command: grant, then claim the promotion immediately when one unlocked.
#[instrument(skip(state, req), fields(user = req.user_id))]
pub async fn grant_xp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GrantRequest>,
) -> JsonResult<GrantReply> {
    if req.user_id.trim().is_empty() {
        return Err(RouteError::Validation("user_id".to_string()));
    }

    let pool = state.pool.ok_or(RouteError::StoreDisabled)?;
    let engine = ProgressionEngine::new(pool);
    let user_id = UserId::from(req.user_id.as_str());

    if let Some(username) = req.username.as_deref() {
        engine.register(&user_id, username).await?;
    }

    let outcome = engine.add_xp(&user_id, req.amount, &req.reason).await?;

    let promotion = if outcome.can_promote {
        Some(
            engine
                .promote(&user_id, outcome.eligible_level, "internal-api")
                .await?,
        )
    } else {
        None
    };

    Ok(Json(GrantReply { outcome, promotion }))
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub user_id: String,
    pub status: VerificationStatus,
}

#[instrument(skip(state, req), fields(user = req.user_id))]
pub async fn set_verification(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerificationRequest>,
) -> JsonResult<Value> {
    if req.user_id.trim().is_empty() {
        return Err(RouteError::Validation("user_id".to_string()));
    }

    let pool = state.pool.ok_or(RouteError::StoreDisabled)?;
    let engine = ProgressionEngine::new(pool);
    let user_id = UserId::from(req.user_id.as_str());

    engine.set_verification(&user_id, req.status).await?;

    let user = engine
        .get_user(&user_id)
        .await?
        .ok_or(crate::progression::ProgressionError::UserNotFound(user_id))?;

    Ok(Json(json!({
        "user_id": user.id,
        "verification_status": user.verification_status,
        "level": levels::get(user.current_level).unwrap_or(levels::base()).name,
    })))
}
