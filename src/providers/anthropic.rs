// Anthropic Claude adapter

use crate::providers::adapter_trait::{ProviderAdapter, REQUEST_TIMEOUT};
use crate::providers::provider_error_message;
use crate::types::{MessageRole, NormalizedRequest, NormalizedResult, ProviderId};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
// The messages API rejects requests without an explicit output budget.
const MAX_TOKENS: u64 = 1024;

pub struct AnthropicAdapter {
    client: Client,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        AnthropicAdapter { client }
    }

    // Claude has no image path here; attachments are dropped silently.
    fn build_messages(&self, request: &NormalizedRequest) -> Vec<Value> {
        let mut messages = Vec::new();

        for msg in &request.history {
            messages.push(json!({
                "role": if msg.role == MessageRole::User { "user" } else { "assistant" },
                "content": msg.content,
            }));
        }

        messages.push(json!({
            "role": "user",
            "content": request.prompt,
        }));

        messages
    }
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn name(&self) -> &str {
        "Anthropic Claude"
    }

    async fn complete(
        &self,
        api_key: &str,
        request: &NormalizedRequest,
    ) -> Result<NormalizedResult> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| ProviderId::Anthropic.default_model().to_string());

        let body = json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "temperature": request.temperature.unwrap_or(0.7),
            "messages": self.build_messages(request),
        });

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        Ok(extract_messages_response(payload))
    }
}

/// Pull the first content block's text out of a messages payload; drift
/// degrades to an empty reply.
pub(crate) fn extract_messages_response(payload: Value) -> NormalizedResult {
    let text = payload["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let tokens_used = match (
        payload["usage"]["input_tokens"].as_u64(),
        payload["usage"]["output_tokens"].as_u64(),
    ) {
        (Some(input), Some(output)) => Some(input + output),
        (Some(input), None) => Some(input),
        (None, Some(output)) => Some(output),
        (None, None) => None,
    };

    let mut result = NormalizedResult::ok(text, 0);
    result.tokens_used = tokens_used;
    result.raw = Some(payload);
    result
}
