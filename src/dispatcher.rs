// Broadcast dispatcher: fans one prompt out to every active provider

use crate::providers::{resolve_adapter, ProviderAdapter};
use crate::types::{
    HistoryMessage, ImageAttachment, NormalizedRequest, NormalizedResult, ProviderConfig,
    ProviderId,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Synthesized error for a provider that cannot be dispatched at all:
/// unresolvable adapter or empty credential. No network call is made.
pub const MISSING_PROVIDER_OR_KEY: &str = "Missing provider or API key";

type Resolver =
    Arc<dyn Fn(ProviderId, Option<&str>) -> Option<Arc<dyn ProviderAdapter>> + Send + Sync>;

/// Issues bounded-time concurrent calls to all configured providers and
/// joins them settle-all: one provider's failure, panic or timeout never
/// blocks another's result. Holds the cancellation token of the current
/// broadcast; a new broadcast supersedes (cancels) the previous one.
pub struct Dispatcher {
    resolver: Resolver,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(resolve_adapter))
    }

    /// Same dispatcher with a custom adapter resolver. Tests inject fakes
    /// here; production code uses [`Dispatcher::new`].
    pub fn with_resolver(resolver: Resolver) -> Self {
        Dispatcher {
            resolver,
            in_flight: Mutex::new(None),
        }
    }

    /// Broadcast one prompt to every configuration, concurrently, and
    /// return the per-provider results once every call has settled.
    ///
    /// A whitespace-only prompt is a no-op (empty map, zero network
    /// calls). Starting a broadcast cancels the previous one still in
    /// flight; at most one broadcast per dispatcher is outstanding.
    pub async fn dispatch_prompt(
        &self,
        prompt: &str,
        configs: &[ProviderConfig],
        history_by_provider: &HashMap<ProviderId, Vec<HistoryMessage>>,
        image: Option<&ImageAttachment>,
    ) -> HashMap<ProviderId, NormalizedResult> {
        if prompt.trim().is_empty() {
            return HashMap::new();
        }

        let cancel = {
            let mut slot = self.in_flight.lock().await;
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        let mut results = HashMap::new();
        let mut ids = Vec::new();
        let mut handles = Vec::new();

        for config in configs {
            let adapter = (self.resolver)(config.id, config.base_url.as_deref());
            let adapter = match adapter {
                Some(adapter) if !config.api_key.trim().is_empty() => adapter,
                _ => {
                    results.insert(config.id, NormalizedResult::failure(MISSING_PROVIDER_OR_KEY, 0));
                    continue;
                }
            };

            let request = NormalizedRequest {
                prompt: prompt.to_string(),
                history: history_by_provider.get(&config.id).cloned().unwrap_or_default(),
                model: config.model.clone(),
                temperature: config.temperature,
                image: image.cloned(),
                cancel: cancel.clone(),
            };
            let api_key = config.api_key.clone();

            ids.push(config.id);
            handles.push(tokio::spawn(async move {
                adapter.send(&api_key, &request).await
            }));
        }

        tracing::debug!(
            providers = handles.len(),
            skipped = results.len(),
            "dispatching broadcast"
        );

        for (id, outcome) in ids.into_iter().zip(join_all(handles).await) {
            let result = match outcome {
                Ok(result) => result,
                // A panicking adapter must not take the broadcast down.
                Err(e) => NormalizedResult::failure(format!("provider task failed: {e}"), 0),
            };
            tracing::debug!(
                provider = id.as_str(),
                success = result.success,
                latency_ms = result.latency_ms,
                "provider call settled"
            );
            results.insert(id, result);
        }

        results
    }

    /// Re-dispatch one provider's most recent user message. Runs under its
    /// own cancellation token: a later broadcast does not cancel it, and it
    /// cancels nothing.
    pub async fn retry_provider(
        &self,
        config: &ProviderConfig,
        prompt: &str,
        history: &[HistoryMessage],
    ) -> NormalizedResult {
        let adapter = (self.resolver)(config.id, config.base_url.as_deref());
        let adapter = match adapter {
            Some(adapter) if !config.api_key.trim().is_empty() => adapter,
            _ => return NormalizedResult::failure(MISSING_PROVIDER_OR_KEY, 0),
        };

        let request = NormalizedRequest {
            prompt: prompt.to_string(),
            history: history.to_vec(),
            model: config.model.clone(),
            temperature: config.temperature,
            image: None,
            cancel: CancellationToken::new(),
        };

        adapter.send(&config.api_key, &request).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
