// Shared types for the multi-provider dispatch core

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Closed set of wire-format families the registry can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Openai,
    Gemini,
    Anthropic,
    Deepseek,
    /// Zhipu GLM, OpenAI-compatible wire format.
    Zai,
    /// User-supplied OpenAI-compatible endpoint; needs a base URL to resolve.
    Generic,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::Openai,
        ProviderId::Gemini,
        ProviderId::Anthropic,
        ProviderId::Deepseek,
        ProviderId::Zai,
        ProviderId::Generic,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Openai => "OpenAI",
            ProviderId::Gemini => "Gemini",
            ProviderId::Anthropic => "Claude",
            ProviderId::Deepseek => "DeepSeek",
            ProviderId::Zai => "GLM",
            ProviderId::Generic => "Custom",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::Openai => "gpt-4o-mini",
            ProviderId::Gemini => "gemini-1.5-flash",
            ProviderId::Anthropic => "claude-3-haiku-20240307",
            ProviderId::Deepseek => "deepseek-chat",
            ProviderId::Zai => "glm-4-air",
            ProviderId::Generic => "gpt-3.5-turbo",
        }
    }

    /// Whether the provider accepts inline image input. Adapters for the
    /// others drop attachments silently instead of failing the call.
    pub fn supports_images(&self) -> bool {
        matches!(self, ProviderId::Openai | ProviderId::Gemini)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Openai => "openai",
            ProviderId::Gemini => "gemini",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Deepseek => "deepseek",
            ProviderId::Zai => "zai",
            ProviderId::Generic => "generic",
        }
    }
}

/// One user-configured provider column. Owned by the settings layer,
/// read-only to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub api_key: String,
    /// Required for [`ProviderId::Generic`], ignored by fixed providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ProviderConfig {
    pub fn new(id: ProviderId, api_key: impl Into<String>) -> Self {
        ProviderConfig {
            id,
            api_key: api_key.into(),
            base_url: None,
            model: None,
            temperature: None,
        }
    }

    /// Model to report for this column: override or the provider default.
    pub fn model_or_default(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.id.default_model().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Success,
    Error,
}

/// One prior turn handed to an adapter. Kept separate from [`Message`] so
/// the wire layer never sees reducer bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        HistoryMessage { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        HistoryMessage { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Image attachment as a `data:` URL, the shape the browser hands us.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub data_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ImageAttachment {
    /// Split into (mime type, base64 payload). Returns `None` for anything
    /// that is not a well-formed base64 data URL; callers drop the
    /// attachment rather than fail the request.
    pub fn parse_data_url(&self) -> Option<(String, String)> {
        let rest = self.data_url.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(";base64,")?;
        if BASE64.decode(payload).is_err() {
            return None;
        }
        let mime = self
            .mime_type
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if header.is_empty() {
                    "image/png".to_string()
                } else {
                    header.to_string()
                }
            });
        Some((mime, payload.to_string()))
    }
}

/// Normalized request handed to every adapter. Built fresh per dispatch,
/// never persisted.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub prompt: String,
    pub history: Vec<HistoryMessage>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub image: Option<ImageAttachment>,
    /// Aborts the call when cancelled; adapters also enforce their own
    /// 30 s wall-clock timeout.
    pub cancel: CancellationToken,
}

impl NormalizedRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        NormalizedRequest {
            prompt: prompt.into(),
            history: Vec::new(),
            model: None,
            temperature: None,
            image: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Normalized outcome of one (provider, dispatch) pair. Failures are data,
/// never errors: one provider's malfunction must not abort the join of the
/// others.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub text: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw provider payload kept for debugging; not part of the contract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl NormalizedResult {
    pub fn ok(text: impl Into<String>, latency_ms: u64) -> Self {
        NormalizedResult {
            text: text.into(),
            success: true,
            error: None,
            raw: None,
            latency_ms,
            tokens_used: None,
        }
    }

    pub fn failure(error: impl Into<String>, latency_ms: u64) -> Self {
        NormalizedResult {
            text: String::new(),
            success: false,
            error: Some(error.into()),
            raw: None,
            latency_ms,
            tokens_used: None,
        }
    }
}

/// One entry in a provider thread. Mutated exactly once (pending →
/// success/error) by the reducer, matched by identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    pub text: String,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
    /// Dispatch generation the placeholder was created under. A result is
    /// applied only when its generation matches, so a late completion can
    /// never land on another dispatch's placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>, image: Option<ImageAttachment>) -> Self {
        Message {
            id: Uuid::new_v4(),
            role: MessageRole::User,
            provider: None,
            text: text.into(),
            status: MessageStatus::Success,
            error: None,
            latency_ms: None,
            image,
            generation: None,
            created_at: Utc::now(),
        }
    }

    pub fn pending_assistant(provider: ProviderId, generation: u64) -> Self {
        Message {
            id: Uuid::new_v4(),
            role: MessageRole::Assistant,
            provider: Some(provider),
            text: String::new(),
            status: MessageStatus::Pending,
            error: None,
            latency_ms: None,
            image: None,
            generation: Some(generation),
            created_at: Utc::now(),
        }
    }
}

/// Ordered message history for one provider within one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderThread {
    pub provider_id: ProviderId,
    pub model: String,
    pub messages: Vec<Message>,
    /// Monotonic dispatch counter; bumped on every dispatch, retry and
    /// clear so in-flight results for superseded dispatches are discarded.
    #[serde(default)]
    pub generation: u64,
}

impl ProviderThread {
    pub fn new(provider_id: ProviderId) -> Self {
        ProviderThread {
            provider_id,
            model: provider_id.default_model().to_string(),
            messages: Vec::new(),
            generation: 0,
        }
    }
}
