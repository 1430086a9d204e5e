// Provider adapters module

pub mod adapter_trait;
pub mod anthropic;
pub mod gemini;
pub mod openai_compat;

pub use adapter_trait::{ProviderAdapter, REQUEST_TIMEOUT};
pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai_compat::OpenAiCompatAdapter;

use crate::types::ProviderId;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

fn fixed_adapters() -> &'static HashMap<ProviderId, Arc<dyn ProviderAdapter>> {
    static FIXED: OnceLock<HashMap<ProviderId, Arc<dyn ProviderAdapter>>> = OnceLock::new();
    FIXED.get_or_init(|| {
        let mut map: HashMap<ProviderId, Arc<dyn ProviderAdapter>> = HashMap::new();
        map.insert(ProviderId::Openai, Arc::new(OpenAiCompatAdapter::openai()));
        map.insert(
            ProviderId::Deepseek,
            Arc::new(OpenAiCompatAdapter::deepseek()),
        );
        map.insert(ProviderId::Zai, Arc::new(OpenAiCompatAdapter::zai()));
        map.insert(ProviderId::Gemini, Arc::new(GeminiAdapter::new()));
        map.insert(ProviderId::Anthropic, Arc::new(AnthropicAdapter::new()));
        map
    })
}

/// Resolve a provider identifier to its adapter. Fixed providers share
/// process-wide instances; the generic family is constructed per call from
/// the supplied base URL and resolves to `None` without one. Never
/// performs I/O.
pub fn resolve_adapter(
    id: ProviderId,
    base_url: Option<&str>,
) -> Option<Arc<dyn ProviderAdapter>> {
    match id {
        ProviderId::Generic => {
            let base = base_url?.trim().trim_end_matches('/');
            if base.is_empty() {
                return None;
            }
            Some(Arc::new(OpenAiCompatAdapter::generic(base)))
        }
        _ => fixed_adapters().get(&id).cloned(),
    }
}

/// Error text for a non-2xx response: the provider's embedded message when
/// present, the HTTP status text otherwise.
pub(crate) fn provider_error_message(payload: &Value, status: StatusCode) -> String {
    payload
        .get("error")
        .and_then(|e| e.get("message").and_then(Value::as_str).or_else(|| e.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fixed_providers_resolve_with_stable_ids() {
        for id in [
            ProviderId::Openai,
            ProviderId::Gemini,
            ProviderId::Anthropic,
            ProviderId::Deepseek,
            ProviderId::Zai,
        ] {
            let adapter = resolve_adapter(id, None).expect("fixed provider must resolve");
            assert_eq!(adapter.id(), id);
            assert!(!adapter.name().is_empty());
        }
    }

    #[test]
    fn generic_requires_a_base_url() {
        assert!(resolve_adapter(ProviderId::Generic, None).is_none());
        assert!(resolve_adapter(ProviderId::Generic, Some("")).is_none());
        assert!(resolve_adapter(ProviderId::Generic, Some("  ")).is_none());

        let adapter = resolve_adapter(ProviderId::Generic, Some("http://localhost:1234"))
            .expect("generic with base URL must resolve");
        assert_eq!(adapter.id(), ProviderId::Generic);
    }

    #[test]
    fn generic_strips_trailing_slash() {
        let adapter = OpenAiCompatAdapter::generic("http://localhost:1234/");
        assert_eq!(
            adapter.endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn error_message_prefers_embedded_over_status_text() {
        let payload = json!({ "error": { "message": "rate limited" } });
        assert_eq!(
            provider_error_message(&payload, StatusCode::INTERNAL_SERVER_ERROR),
            "rate limited"
        );

        let flat = json!({ "error": "quota exceeded" });
        assert_eq!(
            provider_error_message(&flat, StatusCode::TOO_MANY_REQUESTS),
            "quota exceeded"
        );
    }

    #[test]
    fn error_message_falls_back_to_status_text() {
        assert_eq!(
            provider_error_message(&Value::Null, StatusCode::BAD_GATEWAY),
            "Bad Gateway"
        );
        assert_eq!(
            provider_error_message(&json!({}), StatusCode::UNAUTHORIZED),
            "Unauthorized"
        );
    }
}
