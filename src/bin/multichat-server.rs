// Standalone aggregation server.
// Use: cargo run --bin multichat-server

use std::env;
use tracing_subscriber::EnvFilter;

/// Try to bind to a port, returning the actual port used
async fn try_bind_port(start_port: u16) -> u16 {
    let mut port = start_port;
    for _ in 0..10 {
        match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await {
            Ok(listener) => {
                // Successfully bound, drop the listener so the server can use it
                drop(listener);
                return port;
            }
            Err(_) => {
                tracing::warn!("port {} is in use, trying {}...", port, port + 1);
                port += 1;
            }
        }
    }
    // Return the last tried port, let the server fail with a clear message
    port
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let preferred_port: u16 = env::var("MULTICHAT_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);

    let port = try_bind_port(preferred_port).await;

    tracing::info!("multichat aggregation server");
    tracing::info!("API: http://localhost:{}/api/multi-chat", port);
    tracing::info!("Health: http://localhost:{}/api/health", port);

    multichat::http_server::run_http_server(port).await;
}
