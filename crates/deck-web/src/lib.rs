pub mod error;
pub mod events;
pub mod extract;
pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use deck_panel::PanelController;

pub use error::ApiError;

/// Default control-surface address.
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5338;

/// All `/api` routes over one shared controller.
pub fn router(panel: Arc<PanelController>) -> Router {
    Router::new()
        .route("/api/status", get(handlers::status))
        .route("/api/gateway/start", post(handlers::start_gateway))
        .route("/api/gateway/stop", post(handlers::stop_gateway))
        .route("/api/gateway/restart", post(handlers::restart_gateway))
        .route("/api/config", get(handlers::get_config).post(handlers::save_config))
        .route(
            "/api/config/raw",
            get(handlers::read_config_raw).post(handlers::write_config_raw),
        )
        .route("/api/config/generate", post(handlers::generate_config))
        .route("/api/providers", post(handlers::add_provider))
        .route("/api/providers/{id}", delete(handlers::delete_provider))
        .route("/api/providers/{id}/primary", post(handlers::set_primary))
        .route("/api/channels", post(handlers::add_channel))
        .route("/api/channels/{kind}", delete(handlers::delete_channel))
        .route("/api/test-connection", post(handlers::test_connection))
        .route("/api/logs", get(handlers::logs))
        .route("/api/endpoint", get(handlers::endpoint))
        .route("/api/events", get(events::stream))
        .layer(TraceLayer::new_for_http())
        .with_state(panel)
}

/// Serve the control surface until Ctrl-C, then stop the gateway.
/// Only loopback addresses are accepted.
pub async fn run(addr: SocketAddr, panel: Arc<PanelController>) -> Result<()> {
    if !addr.ip().is_loopback() {
        anyhow::bail!("Refusing to serve the control panel on non-loopback address {addr}");
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Control panel listening on http://{}", listener.local_addr()?);

    serve(listener, panel, shutdown_signal()).await
}

/// Serve on `listener` until `signal` resolves. The panel is shut down
/// (gateway stopped, event streams ended) before open connections drain.
pub async fn serve<F>(listener: TcpListener, panel: Arc<PanelController>, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let on_signal = Arc::clone(&panel);
    let served = axum::serve(listener, router(Arc::clone(&panel)))
        .with_graceful_shutdown(async move {
            signal.await;
            on_signal.shutdown();
        })
        .await;

    panel.shutdown();
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down control panel");
}
