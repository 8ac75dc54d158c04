use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::constants::{CONTEXT_MESSAGES, PERSONA_PROMPT, STORED_CONTEXT_ROWS};
use crate::db;
use crate::db::prelude::*;

pub mod fallback;
pub mod history;
pub mod provider;

use history::RollingHistory;
use provider::{ProviderChain, ProviderResult};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub user_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub source: &'static str,
    pub memory_saved: bool,
}

/// Sequences one chat exchange: resolve context, walk the provider chain,
/// fall back to the canned responder, persist. Store and provider failures
/// degrade; this never returns an empty response.
pub struct ChatOrchestrator {
    providers: ProviderChain,
    history: Arc<RollingHistory>,
}

impl ChatOrchestrator {
    pub async fn from_env() -> ProviderResult<Self> {
        Ok(Self {
            providers: ProviderChain::from_env().await?,
            history: Arc::new(RollingHistory::new()),
        })
    }

    pub fn history(&self) -> &RollingHistory {
        &self.history
    }

    pub fn backend_status(&self) -> Vec<(&'static str, bool)> {
        self.providers.backend_status()
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    #[instrument(skip(self, req), fields(user = ?req.user_id))]
    pub async fn respond(&self, req: &ChatRequest, channel: Option<&str>) -> ChatReply {
        let user_id = req.user_id.as_deref().map(UserId::from);
        let context = self.resolve_context(req, channel, user_id.as_ref()).await;

        let (response, source) = match self
            .providers
            .complete(PERSONA_PROMPT, context.as_deref(), &req.message)
            .await
        {
            Some((text, kind)) => (text, kind.label()),
            None => (fallback::respond(&req.message), "fallback"),
        };

        let memory_saved = self
            .save_exchange(user_id.as_ref(), &req.message, &response, source)
            .await;

        tracing::info!(source, memory_saved, "chat exchange complete");

        ChatReply {
            response,
            source,
            memory_saved,
        }
    }

    /// Explicit caller context wins; then the channel's rolling window; then
    /// whatever the store remembers about this user.
    async fn resolve_context(
        &self,
        req: &ChatRequest,
        channel: Option<&str>,
        user_id: Option<&UserId>,
    ) -> Option<String> {
        if let Some(context) = req.context.as_deref()
            && !context.trim().is_empty()
        {
            return Some(context.to_string());
        }

        if let Some(channel) = channel
            && let Some(context) = self.history.context(channel, CONTEXT_MESSAGES)
        {
            return Some(context);
        }

        let pool = db::try_pool()?;
        match ConversationRepository::new(pool)
            .recent(user_id, STORED_CONTEXT_ROWS)
            .await
        {
            Ok(rows) if !rows.is_empty() => {
                let lines = rows
                    .iter()
                    .map(|row| {
                        let truncated: String = row.message.chars().take(100).collect();
                        format!("User: {truncated}")
                    })
                    .collect::<Vec<_>>()
                    .join("\n");

                Some(lines)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = ?e, "context fetch failed, continuing without");
                None
            }
        }
    }

    async fn save_exchange(
        &self,
        user_id: Option<&UserId>,
        message: &str,
        response: &str,
        source: &str,
    ) -> bool {
        let Some(pool) = db::try_pool() else {
            return false;
        };

        match ConversationRepository::new(pool)
            .insert(user_id, message, response, source)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = ?e, "conversation save failed");
                false
            }
        }
    }
}
