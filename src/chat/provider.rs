use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::constants::{
    DEEPSEEK_API_URL, DEEPSEEK_MODEL, MAX_COMPLETION_TOKENS, OPENAI_API_URL, OPENAI_MODEL,
    PROVIDER_TIMEOUT_SECS, SAMPLING_TEMPERATURE,
};
use crate::util::env::{self, EnvErr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DeepSeek,
    OpenAi,
}

impl ProviderKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => DEEPSEEK_API_URL,
            ProviderKind::OpenAi => OPENAI_API_URL,
        }
    }

    pub fn model(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => DEEPSEEK_MODEL,
            ProviderKind::OpenAi => OPENAI_MODEL,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::OpenAi => "openai",
        }
    }
}

#[derive(Clone)]
pub struct Provider {
    pub kind: ProviderKind,
    api_key: String,
}

// keys stay out of debug logs
impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Ordered list of capability-equivalent completion backends, tried in
/// sequence. A provider failing (timeout, non-2xx, empty text) just hands the
/// request to the next one.
#[derive(Debug)]
pub struct ProviderChain {
    client: reqwest::Client,
    providers: Vec<Provider>,
}

impl ProviderChain {
    pub async fn from_env() -> ProviderResult<Self> {
        let vars = env::vars().await?;
        let mut providers = Vec::new();

        // cheapest first
        if let Some(key) = vars.deepseek_api_key.clone() {
            providers.push(Provider {
                kind: ProviderKind::DeepSeek,
                api_key: key,
            });
        }

        if let Some(key) = vars.openai_api_key.clone() {
            providers.push(Provider {
                kind: ProviderKind::OpenAi,
                api_key: key,
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()?;

        tracing::info!(
            configured = ?providers.iter().map(|p| p.kind.label()).collect::<Vec<_>>(),
            "provider chain ready"
        );

        Ok(Self { client, providers })
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// (label, configured) for every known backend, for health reporting
    pub fn backend_status(&self) -> Vec<(&'static str, bool)> {
        [ProviderKind::DeepSeek, ProviderKind::OpenAi]
            .into_iter()
            .map(|kind| {
                let configured = self.providers.iter().any(|p| p.kind == kind);
                (kind.label(), configured)
            })
            .collect()
    }

    /// First non-empty completion from the chain, or `None` when every
    /// provider is down or unconfigured
    #[instrument(skip(self, persona, context, message))]
    pub async fn complete(
        &self,
        persona: &str,
        context: Option<&str>,
        message: &str,
    ) -> Option<(String, ProviderKind)> {
        for provider in &self.providers {
            match self.query(provider, persona, context, message).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Some((text, provider.kind));
                }
                Ok(_) => {
                    tracing::warn!(provider = provider.kind.label(), "empty completion");
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.kind.label(),
                        error = ?e,
                        "provider failure, falling through"
                    );
                }
            }
        }

        None
    }

    #[instrument(skip(self, provider, persona, context, message), fields(provider = provider.kind.label()))]
    async fn query(
        &self,
        provider: &Provider,
        persona: &str,
        context: Option<&str>,
        message: &str,
    ) -> ProviderResult<String> {
        let mut messages = vec![OutboundMessage {
            role: "system",
            content: persona.to_string(),
        }];

        if let Some(context) = context {
            messages.push(OutboundMessage {
                role: "assistant",
                content: format!("Recent context: {context}"),
            });
        }

        messages.push(OutboundMessage {
            role: "user",
            content: message.to_string(),
        });

        let body = CompletionRequest {
            model: provider.kind.model(),
            messages,
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: SAMPLING_TEMPERATURE,
        };

        let res = self
            .client
            .post(provider.kind.endpoint())
            .bearer_auth(&provider.api_key)
            .json(&body)
            .send()
            .await?;

        // surface whatever detail the provider put in the error body before
        // handing the request to the next backend
        if !res.status().is_success() {
            let code = res.status().as_u16();
            let detail = res
                .json::<Value>()
                .await
                .ok()
                .and_then(|reason| reason["error"]["message"].as_str().map(str::to_owned));

            tracing::error!(code, detail = ?detail, "non-2xx completion response");
            return Err(ProviderErr::Status {
                provider: provider.kind.label(),
                code,
                detail,
            });
        }

        let parsed = res.json::<CompletionResponse>().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ProviderErr::EmptyCompletion)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: &'static str,
    messages: Vec<OutboundMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OutboundMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: InboundMessage,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    content: String,
}

pub type ProviderResult<T> = core::result::Result<T, ProviderErr>;

#[derive(Debug, Error)]
pub enum ProviderErr {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("while parsing environment vars: {0}")]
    EnvError(#[from] EnvErr),

    #[error("provider '{provider}' returned {code}")]
    Status {
        provider: &'static str,
        code: u16,
        detail: Option<String>,
    },

    #[error("completion response contained no choices")]
    EmptyCompletion,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_completion_response_parse() {
        let raw = r#"{
            "choices": [
                { "message": { "role": "assistant", "content": "try splitting the task" } }
            ]
        }"#;

        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content,
            "try splitting the task"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = CompletionRequest {
            model: "deepseek-chat",
            messages: vec![OutboundMessage {
                role: "system",
                content: "persona".into(),
            }],
            max_tokens: 500,
            temperature: 0.7,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["messages"][0]["role"], "system");
    }
}
