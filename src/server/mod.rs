//! Axum HTTP server exposing the connect API.
//!
//! Routes:
//! - `GET  /api/health`
//! - `POST /api/whatsapp/connect`
//! - `GET  /api/whatsapp/connection`

pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::{RwLock, oneshot};
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::bearer_token;
use crate::error::{ConnectError, ServerError};
use crate::provisioning::{ConnectOrchestrator, ConnectRequest, ConnectResponse};
use crate::server::types::HealthResponse;

/// Shared state for all handlers.
pub struct ServerState {
    pub orchestrator: Arc<ConnectOrchestrator>,
    pub shutdown_tx: RwLock<Option<oneshot::Sender<()>>>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<ConnectOrchestrator>) -> Self {
        Self {
            orchestrator,
            shutdown_tx: RwLock::new(None),
        }
    }

    /// Ask the running server to stop accepting connections.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ]));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/whatsapp/connect", post(connect_handler))
        .route("/api/whatsapp/connection", get(connection_handler))
        .layer(cors)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr`, spawn the server and return the bound address.
///
/// The server runs until [`ServerState::shutdown`] is called.
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<SocketAddr, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    let bound_addr = listener.local_addr().map_err(|e| ServerError::Bind {
        addr: addr.to_string(),
        reason: format!("Failed to get local addr: {}", e),
    })?;

    let app = router(state.clone());

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("HTTP server shutting down");
            })
            .await
        {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "HTTP server listening");
    Ok(bound_addr)
}

fn envelope(response: ConnectResponse) -> Response {
    let status =
        StatusCode::from_u16(response.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

fn bearer_from(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    bearer_token(raw).map(str::to_string)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

async fn connect_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Result<Json<ConnectRequest>, JsonRejection>,
) -> Response {
    let bearer = bearer_from(&headers);
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return envelope(ConnectResponse::failure(&ConnectError::validation(format!(
                "Invalid request body: {}",
                rejection.body_text()
            ))));
        }
    };

    // Detached so a client disconnect does not abort a half-finished flow.
    let orchestrator = state.orchestrator.clone();
    let task =
        tokio::spawn(async move { orchestrator.connect(bearer.as_deref(), request).await });

    match task.await {
        Ok(response) => envelope(response),
        Err(e) => {
            tracing::error!("Connect task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "message": "Internal error while connecting",
                })),
            )
                .into_response()
        }
    }
}

async fn connection_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    let bearer = bearer_from(&headers);
    match state.orchestrator.connection_view(bearer.as_deref()).await {
        Ok(view) => Json(view).into_response(),
        Err(error) => envelope(ConnectResponse::failure(&error)),
    }
}
