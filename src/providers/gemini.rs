// Google Gemini adapter

use crate::providers::adapter_trait::{ProviderAdapter, REQUEST_TIMEOUT};
use crate::providers::provider_error_message;
use crate::types::{MessageRole, NormalizedRequest, NormalizedResult, ProviderId};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiAdapter {
    client: Client,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        GeminiAdapter { client }
    }

    /// History turns as user/model contents, then the prompt turn. The
    /// image becomes an `inline_data` part when its data URL parses;
    /// malformed attachments are dropped, not failed.
    fn build_contents(&self, request: &NormalizedRequest) -> Vec<Value> {
        let mut contents = Vec::new();

        for msg in &request.history {
            contents.push(json!({
                "role": if msg.role == MessageRole::User { "user" } else { "model" },
                "parts": [{ "text": msg.content }],
            }));
        }

        let mut parts = vec![json!({ "text": request.prompt })];
        if let Some((mime_type, data)) = request
            .image
            .as_ref()
            .and_then(|img| img.parse_data_url())
        {
            parts.push(json!({
                "inline_data": { "mime_type": mime_type, "data": data },
            }));
        }
        contents.push(json!({ "role": "user", "parts": parts }));

        contents
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn name(&self) -> &str {
        "Google Gemini"
    }

    async fn complete(
        &self,
        api_key: &str,
        request: &NormalizedRequest,
    ) -> Result<NormalizedResult> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| ProviderId::Gemini.default_model().to_string());

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            BASE_URL,
            urlencoding::encode(&model),
            urlencoding::encode(api_key),
        );

        let body = json!({
            "contents": self.build_contents(request),
            "generationConfig": { "temperature": request.temperature.unwrap_or(0.7) },
        });

        let response = self
            .client
            .post(&url)
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

        Ok(extract_generate_content(payload))
    }
}

/// Pull the candidate text out of a `generateContent` payload; drift
/// degrades to an empty reply.
pub(crate) fn extract_generate_content(payload: Value) -> NormalizedResult {
    let text = payload["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let tokens_used = payload["usageMetadata"]["totalTokenCount"].as_u64();

    let mut result = NormalizedResult::ok(text, 0);
    result.tokens_used = tokens_used;
    result.raw = Some(payload);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HistoryMessage, ImageAttachment};

    #[test]
    fn history_roles_map_to_user_and_model() {
        let adapter = GeminiAdapter::new();
        let mut request = NormalizedRequest::new("and now?");
        request.history = vec![
            HistoryMessage::user("first"),
            HistoryMessage::assistant("second"),
        ];

        let contents = adapter.build_contents(&request);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "and now?");
    }

    #[test]
    fn image_becomes_inline_data_part() {
        let adapter = GeminiAdapter::new();
        let mut request = NormalizedRequest::new("describe");
        request.image = Some(ImageAttachment {
            data_url: "data:image/jpeg;base64,aGVsbG8=".to_string(),
            mime_type: None,
        });

        let contents = adapter.build_contents(&request);
        let parts = contents[0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "aGVsbG8=");
    }

    #[test]
    fn extracts_candidate_text_and_token_count() {
        let payload = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "a reply" }] } }],
            "usageMetadata": { "totalTokenCount": 21 },
        });
        let result = extract_generate_content(payload);
        assert!(result.success);
        assert_eq!(result.text, "a reply");
        assert_eq!(result.tokens_used, Some(21));
    }

    #[test]
    fn empty_candidates_degrade_to_empty_text() {
        let result = extract_generate_content(serde_json::json!({}));
        assert!(result.success);
        assert_eq!(result.text, "");
    }
}
