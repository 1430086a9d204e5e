// HTTP server exposing the multi-provider fan-out as one aggregation endpoint

use crate::dispatcher::Dispatcher;
use crate::types::{HistoryMessage, ImageAttachment, ProviderConfig, ProviderId};
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiChatRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub providers: HashMap<ProviderId, ProviderSelection>,
    /// Shared fallback history, used for providers without their own.
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    #[serde(default)]
    pub history_by_provider: HashMap<ProviderId, Vec<HistoryMessage>>,
    #[serde(default)]
    pub image: Option<ImageAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSelection {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Per-provider slot of the aggregated reply. `output` and `error` are
/// serialized even when null; clients switch on whichever is set.
#[derive(Debug, Serialize)]
pub struct ProviderResponse {
    pub model: String,
    pub output: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MultiChatResponse {
    pub prompt: String,
    pub responses: HashMap<ProviderId, ProviderResponse>,
}

pub fn router() -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/multi-chat", post(multi_chat))
        .layer(cors)
}

pub async fn run_http_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind HTTP server to port {port}: {e}");
            tracing::error!("try setting MULTICHAT_HTTP_PORT to a different port");
            return;
        }
    };
    tracing::info!("listening on http://{addr}");
    if let Err(e) = axum::serve(listener, router()).await {
        tracing::error!("HTTP server error: {e}");
    }
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "multichat API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "GET /api/health",
            "multiChat": "POST /api/multi-chat",
        },
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn bad_request(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

async fn multi_chat(Json(body): Json<serde_json::Value>) -> axum::response::Response {
    let request: MultiChatRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        // Matches the aggregation contract: an unprocessable body is an
        // internal failure with an error string, not a framework reject.
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    if request.prompt.trim().is_empty() {
        return bad_request("Missing 'prompt' in request body");
    }
    if request.providers.is_empty() {
        return bad_request("Missing 'providers' in request body");
    }

    let configs: Vec<ProviderConfig> = request
        .providers
        .iter()
        .filter(|(_, selection)| !selection.api_key.trim().is_empty())
        .map(|(&id, selection)| ProviderConfig {
            id,
            api_key: selection.api_key.clone(),
            base_url: selection.base_url.clone(),
            model: selection.model.clone(),
            temperature: selection.temperature,
        })
        .collect();

    if configs.is_empty() {
        return bad_request("No providers selected. Provide at least one API key.");
    }

    let mut history_by_provider = HashMap::new();
    for config in &configs {
        let history = request
            .history_by_provider
            .get(&config.id)
            .unwrap_or(&request.history)
            .clone();
        history_by_provider.insert(config.id, history);
    }

    let results = Dispatcher::new()
        .dispatch_prompt(
            &request.prompt,
            &configs,
            &history_by_provider,
            request.image.as_ref(),
        )
        .await;

    let mut responses = HashMap::new();
    for config in &configs {
        let slot = match results.get(&config.id) {
            Some(result) if result.success => ProviderResponse {
                model: config.model_or_default(),
                output: Some(result.text.clone()),
                error: None,
            },
            Some(result) => ProviderResponse {
                model: config.model_or_default(),
                output: None,
                error: result.error.clone(),
            },
            None => continue,
        };
        responses.insert(config.id, slot);
    }

    (
        StatusCode::OK,
        Json(MultiChatResponse {
            prompt: request.prompt,
            responses,
        }),
    )
        .into_response()
}
