//! Axum HTTP server for the translation relay.
//!
//! This module provides the `serve()` function that runs the relay using a
//! pre-bound `TcpListener` (from the supervisor).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use xtl_core::{FAILURE_BODY, RelayEngine};

use crate::models::TranslateQuery;

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Shared application state for the relay server.
#[derive(Clone)]
struct AppState {
    engine: Arc<RelayEngine>,
}

/// Build the relay router.
///
/// Handlers read the peer address through [`ConnectInfo`], so the router has
/// to be served with `into_make_service_with_connect_info::<SocketAddr>()`
/// (or given a `MockConnectInfo` layer in tests).
pub fn create_router(engine: Arc<RelayEngine>) -> Router {
    Router::new()
        .route("/", get(translate))
        .route("/health", get(health_check))
        .fallback(not_found)
        .with_state(AppState { engine })
}

/// Run the relay server until the cancellation token is triggered.
///
/// In-flight requests are allowed to finish; only new connections stop.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<RelayEngine>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Relay listening on {addr}");
    info!("Configure XUnity.AutoTranslator with Endpoint=http://{addr}/");

    let app = create_router(engine).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Relay server shut down");
    Ok(())
}

/// Translate the `text` query parameter.
async fn translate(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let text = TranslateQuery::from_pairs(pairs).text.unwrap_or_default();
    debug!(peer = %peer, "GET /");

    match state.engine.translate(&text, &peer.ip().to_string()).await {
        Ok(translation) => plain_text(StatusCode::OK, translation),
        Err(e) => {
            error!("Translation failed: {e}");
            plain_text(StatusCode::INTERNAL_SERVER_ERROR, FAILURE_BODY.to_string())
        }
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn not_found() -> Response {
    plain_text(StatusCode::NOT_FOUND, "Not Found".to_string())
}

fn plain_text(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)], body).into_response()
}
