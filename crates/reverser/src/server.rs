//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Form, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::error::ProxyError;
use crate::proxy::{correlation, Dispatcher};
use crate::registry::{Registry, Snapshot, Target};
use crate::stats::{ProxyStats, StatsSnapshot};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub dispatcher: Dispatcher,
    pub stats: ProxyStats,
}

impl AppState {
    pub fn new(registry: Registry, client: reqwest::Client, max_body_bytes: usize) -> Self {
        let dispatcher = Dispatcher::new(registry.clone(), client, max_body_bytes);
        Self {
            registry,
            dispatcher,
            stats: ProxyStats::new(),
        }
    }
}

/// Build the application router.
///
/// `/proxy/` traffic goes to the dispatcher; everything else is the
/// management surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/proxy/", any(handle_proxy))
        .route("/proxy/{*rest}", any(handle_proxy))
        .route("/api/targets", get(handle_list_targets).post(handle_register))
        .route("/api/targets/{path}", delete(handle_unregister))
        .route("/register", post(handle_form_register))
        .route("/unregister", get(handle_legacy_unregister))
        .route("/api/stats", get(handle_get_stats))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState, listen_addr: &str) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(address = %listen_addr, "reverser listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("reverser shut down gracefully");
    Ok(())
}

/// Handler for every method under `/proxy/`.
async fn handle_proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let request_id = correlation::generate_id();
    let span = reverser_tracing::proxy_request_span!(
        request_id,
        request.method(),
        request.uri().path()
    );

    state.stats.inc_requests();

    async {
        let response = match state.dispatcher.dispatch(request, &request_id).await {
            Ok(response) => {
                state.stats.inc_forwarded();
                response
            }
            Err(e) => {
                match &e {
                    ProxyError::NotFound(_) => {
                        state.stats.inc_not_found();
                        tracing::info!(error = %e, "No target registered");
                    }
                    ProxyError::UpstreamUnreachable(_) => {
                        state.stats.inc_upstream_errors();
                    }
                    _ => tracing::warn!(error = %e, "Proxy request rejected"),
                }
                e.into_response()
            }
        };

        tracing::Span::current().record("status", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    path: String,
    #[serde(default)]
    target: String,
}

/// POST /api/targets
async fn handle_register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Target>), ProxyError> {
    let Json(req) = payload.map_err(|e| ProxyError::BadRequest(e.body_text()))?;
    let target = register_target(&state.registry, &req)?;
    Ok((StatusCode::CREATED, Json(target)))
}

/// POST /register
///
/// Form-encoded `path` and `target`. On success the caller is sent back to
/// the listing, like `/unregister`.
async fn handle_form_register(
    State(state): State<Arc<AppState>>,
    payload: Result<Form<RegisterRequest>, FormRejection>,
) -> Result<Response, ProxyError> {
    let Form(req) = payload.map_err(|e| ProxyError::BadRequest(e.body_text()))?;
    register_target(&state.registry, &req)?;
    Ok((StatusCode::FOUND, [(header::LOCATION, "/api/targets")]).into_response())
}

fn register_target(registry: &Registry, req: &RegisterRequest) -> Result<Target, ProxyError> {
    if req.path.is_empty() {
        return Err(ProxyError::Validation {
            field: "path",
            message: "Path is required",
        });
    }
    if req.target.is_empty() {
        return Err(ProxyError::Validation {
            field: "target",
            message: "The target url is required",
        });
    }

    registry.register(&req.target, &req.path)
}

/// GET /api/targets
async fn handle_list_targets(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.registry.list())
}

/// DELETE /api/targets/{path}
async fn handle_unregister(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<StatusCode, ProxyError> {
    state.registry.unregister(&path)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct UnregisterQuery {
    #[serde(default)]
    path: String,
}

/// GET /unregister?path=...
///
/// Link-style unregister: an unknown identifier is ignored and the caller
/// is always sent back to the listing.
async fn handle_legacy_unregister(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnregisterQuery>,
) -> Response {
    if let Err(e) = state.registry.unregister(&query.path) {
        tracing::debug!(error = %e, "Ignoring unregister of unknown target");
    }
    (StatusCode::FOUND, [(header::LOCATION, "/api/targets")]).into_response()
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    counters: StatsSnapshot,
    targets: usize,
}

/// GET /api/stats
async fn handle_get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        counters: state.stats.snapshot(),
        targets: state.registry.len(),
    })
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
