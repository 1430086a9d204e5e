// Provider adapter trait

use crate::types::{NormalizedRequest, NormalizedResult, ProviderId};
use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Hard wall-clock budget for a single provider call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;
    fn name(&self) -> &str;

    /// Provider-specific request/response translation. May fail; the
    /// [`send`](ProviderAdapter::send) boundary owns error mapping.
    async fn complete(
        &self,
        api_key: &str,
        request: &NormalizedRequest,
    ) -> Result<NormalizedResult>;

    /// Single attempt under the hard timeout, raced against the request's
    /// cancellation token. Every failure mode (transport error, non-2xx,
    /// malformed body, timeout, cancellation) comes back as
    /// `success: false`; nothing escapes this boundary as an error.
    async fn send(&self, api_key: &str, request: &NormalizedRequest) -> NormalizedResult {
        let started = Instant::now();
        let outcome = tokio::select! {
            res = timeout(REQUEST_TIMEOUT, self.complete(api_key, request)) => match res {
                Ok(inner) => inner,
                Err(_) => Err(anyhow::anyhow!(
                    "request aborted after {}s timeout",
                    REQUEST_TIMEOUT.as_secs()
                )),
            },
            _ = request.cancel.cancelled() => Err(anyhow::anyhow!("request cancelled")),
        };
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(mut result) => {
                result.latency_ms = latency_ms;
                result
            }
            Err(e) => NormalizedResult::failure(format!("{e:#}"), latency_ms),
        }
    }
}
