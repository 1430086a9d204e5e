// OpenAI-compatible adapter: covers OpenAI, DeepSeek, GLM and custom endpoints

use crate::providers::adapter_trait::{ProviderAdapter, REQUEST_TIMEOUT};
use crate::providers::provider_error_message;
use crate::types::{MessageRole, NormalizedRequest, NormalizedResult, ProviderId};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// One adapter type for the whole `chat/completions` wire family. Fixed
/// providers differ only in endpoint and identity; the generic variant is
/// built on demand from a user-supplied base URL.
pub struct OpenAiCompatAdapter {
    id: ProviderId,
    name: String,
    endpoint: String,
    supports_images: bool,
    client: Client,
}

impl OpenAiCompatAdapter {
    pub fn openai() -> Self {
        Self::with_endpoint(ProviderId::Openai, "https://api.openai.com/v1/chat/completions")
    }

    pub fn deepseek() -> Self {
        Self::with_endpoint(ProviderId::Deepseek, "https://api.deepseek.com/chat/completions")
    }

    pub fn zai() -> Self {
        Self::with_endpoint(
            ProviderId::Zai,
            "https://open.bigmodel.cn/api/paas/v4/chat/completions",
        )
    }

    /// Custom OpenAI-compatible endpoint, e.g. a local inference server.
    /// `base_url` must already have its trailing slash stripped.
    pub fn generic(base_url: &str) -> Self {
        let endpoint = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        Self::with_endpoint(ProviderId::Generic, &endpoint)
    }

    fn with_endpoint(id: ProviderId, endpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        OpenAiCompatAdapter {
            id,
            name: id.display_name().to_string(),
            endpoint: endpoint.to_string(),
            supports_images: id.supports_images(),
            client,
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// System prompt, full role-tagged history, then the user turn. The
    /// image rides along as an `image_url` data-URL part only when this
    /// instance's provider is multimodal; otherwise it is dropped.
    fn build_messages(&self, request: &NormalizedRequest) -> Vec<Value> {
        let mut messages = vec![json!({
            "role": "system",
            "content": SYSTEM_PROMPT,
        })];

        for msg in &request.history {
            messages.push(json!({
                "role": if msg.role == MessageRole::User { "user" } else { "assistant" },
                "content": msg.content,
            }));
        }

        let image = request
            .image
            .as_ref()
            .filter(|_| self.supports_images)
            .and_then(|img| img.parse_data_url().map(|_| img));
        match image {
            Some(img) => messages.push(json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": request.prompt },
                    { "type": "image_url", "image_url": { "url": img.data_url } },
                ],
            })),
            None => messages.push(json!({
                "role": "user",
                "content": request.prompt,
            })),
        }

        messages
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        api_key: &str,
        request: &NormalizedRequest,
    ) -> Result<NormalizedResult> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.id.default_model().to_string());

        let body = json!({
            "model": model,
            "messages": self.build_messages(request),
            "temperature": request.temperature.unwrap_or(0.7),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            anyhow::bail!("{}", provider_error_message(&payload, status));
        }

        Ok(extract_chat_completion(payload))
    }
}

/// Pull the assistant text out of a `chat/completions` payload. Missing or
/// reshaped fields degrade to an empty reply instead of an error.
pub(crate) fn extract_chat_completion(payload: Value) -> NormalizedResult {
    let text = payload["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let tokens_used = payload["usage"]["total_tokens"].as_u64();

    let mut result = NormalizedResult::ok(text, 0);
    result.tokens_used = tokens_used;
    result.raw = Some(payload);
    result
}
