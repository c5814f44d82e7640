//! HTTP API Server
//!
//! REST API for creating, listing, inspecting and revoking clients.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::auth::require_bearer;
use super::qr::render_png;
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::peer::PeerRegistry;

/// Shared application state
pub struct AppState {
    /// Registry owning the client store and live peer table
    pub registry: Arc<PeerRegistry>,
    /// Bearer token required on every request
    pub token: String,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, registry: Arc<PeerRegistry>) -> Self {
        let state = Arc::new(AppState {
            registry,
            token: config.token.clone(),
        });

        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router. Every route, including unknown ones, sits behind
    /// the bearer check.
    pub fn create_router(state: Arc<AppState>, cors_enabled: bool) -> Router {
        let router = Router::new()
            .route("/clients", get(handle_list).post(handle_create))
            .route("/clients/:name", get(handle_get).delete(handle_delete))
            .fallback(handle_unknown_route)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                require_bearer,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        if cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server, returning once `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = Self::create_router(Arc::clone(&self.state), self.config.cors_enabled);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Create request
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateClientRequest {
    pub name: String,
}

/// Create response
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateClientResponse {
    pub message: String,
    pub name: String,
    pub address: String,
    pub config: String,
}

/// Client list response
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientListResponse {
    pub clients: Vec<String>,
}

/// Single client response
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientResponse {
    pub name: String,
    pub config: String,
}

/// Plain message response
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Output selection for `GET /clients/:name`
#[derive(Debug, Default, Deserialize)]
pub struct GetClientQuery {
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub qr: Option<String>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

// ============ Handlers ============

async fn handle_unknown_route() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Route not found".to_string(),
            code: "ROUTE_NOT_FOUND".to_string(),
        }),
    )
}

async fn handle_create(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<CreateClientRequest>, JsonRejection>,
) -> Result<Json<CreateClientResponse>> {
    let Json(req) = body.map_err(|e| Error::ValidationFailed(e.body_text()))?;

    let peer = state.registry.create(&req.name).await?;

    Ok(Json(CreateClientResponse {
        message: "Client created successfully".to_string(),
        name: peer.name,
        address: peer.ipv4.to_string(),
        config: peer.config,
    }))
}

async fn handle_list(State(state): State<Arc<AppState>>) -> Result<Json<ClientListResponse>> {
    let clients = state.registry.list()?;
    Ok(Json(ClientListResponse { clients }))
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<GetClientQuery>,
) -> Result<Response> {
    let config = state.registry.read(&name)?;

    if query.raw.as_deref() == Some("true") {
        return Ok(([(header::CONTENT_TYPE, "text/plain")], config).into_response());
    }

    if query.qr.as_deref() == Some("true") {
        let png = render_png(&config)?;
        return Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response());
    }

    Ok(Json(ClientResponse { name, config }).into_response())
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.registry.delete(&name).await?;
    Ok(Json(MessageResponse {
        message: "Client deleted successfully".to_string(),
    }))
}
