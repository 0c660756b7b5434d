//! HTTP acceptance layer for the relay.
//!
//! Upgrades `GET <ws_path>?userID=..&peerID=..` to a WebSocket and hands it
//! to [`Relay::accept`](crate::relay::Relay::accept). Also serves `/health`.

pub mod health;
pub mod ws;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

use crate::relay::Relay;

/// Shared state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub max_frame_bytes: usize,
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws::connect))
        .route("/health", get(health::health))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
///
/// Upgraded WebSockets are not tracked by the HTTP server; callers close the
/// live sessions with [`Relay::shutdown`] afterwards.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Relay listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
